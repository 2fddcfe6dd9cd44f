//! Loan management service

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{CreateLoan, Loan, LoanQuery, LoanRecord},
        pagination::PageRequest,
        user::{User, UserClaims},
    },
    repository::{loans::LoanStore, users::UserStore},
};

#[derive(Clone)]
pub struct LoansService {
    loans: Arc<dyn LoanStore>,
    users: Arc<dyn UserStore>,
}

impl LoansService {
    pub fn new(loans: Arc<dyn LoanStore>, users: Arc<dyn UserStore>) -> Self {
        Self { loans, users }
    }

    /// Resolve the account behind a validated token
    async fn resolve_caller(&self, claims: &UserClaims) -> AppResult<User> {
        self.users
            .find_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Authentication("Unknown user".to_string()))
    }

    // =========================================================================
    // SELF-SERVICE
    // =========================================================================

    /// Borrow a book for the caller
    pub async fn borrow(&self, claims: &UserClaims, book_id: i32) -> AppResult<Loan> {
        let user = self.resolve_caller(claims).await?;
        self.loans.open(user.id, book_id).await
    }

    /// Return one of the caller's loans
    pub async fn return_own(&self, claims: &UserClaims, loan_id: i32) -> AppResult<Loan> {
        let user = self.resolve_caller(claims).await?;
        self.loans.close(loan_id, Some(user.id)).await
    }

    /// The caller's loans; any `user_id` filter in the query is ignored
    pub async fn list_own(
        &self,
        claims: &UserClaims,
        query: LoanQuery,
        page: &PageRequest,
    ) -> AppResult<(Vec<Loan>, i64)> {
        let user = self.resolve_caller(claims).await?;
        let scoped = LoanQuery {
            user_id: Some(user.id),
            ..query
        };
        self.loans.search(&scoped, page).await
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Get loan by ID
    pub async fn get(&self, loan_id: i32) -> AppResult<Loan> {
        self.loans.get_by_id(loan_id).await
    }

    /// Search all loans
    pub async fn list(&self, query: &LoanQuery, page: &PageRequest) -> AppResult<(Vec<Loan>, i64)> {
        self.loans.search(query, page).await
    }

    /// Lend a book to any user, with the usual checks
    pub async fn create_for_user(&self, loan: CreateLoan) -> AppResult<Loan> {
        if !self.users.exists(loan.user_id).await? {
            return Err(AppError::NotFound("User does not exist".to_string()));
        }
        self.loans.open(loan.user_id, loan.book_id).await
    }

    /// Return any loan
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<Loan> {
        self.loans.close(loan_id, None).await
    }

    /// Insert a historical loan record.
    ///
    /// Skips availability and duplicate checks and leaves the copy counter
    /// untouched.
    pub async fn backfill(&self, record: LoanRecord) -> AppResult<Loan> {
        record.check_consistency()?;
        self.loans.insert_record(&record).await
    }

    /// Correct a loan record; copy counters are not adjusted
    pub async fn edit(&self, loan_id: i32, record: LoanRecord) -> AppResult<Loan> {
        record.check_consistency()?;
        self.loans.update_record(loan_id, &record).await
    }

    /// Delete a loan, compensating the copy counter if it was active
    pub async fn delete(&self, loan_id: i32) -> AppResult<Loan> {
        self.loans.delete(loan_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{loan::LoanStatus, user::Role},
        repository::{loans::MockLoanStore, users::MockUserStore},
    };
    use chrono::Utc;
    use mockall::predicate::*;
    use tokio_test::{assert_err, assert_ok};

    fn claims(username: &str) -> UserClaims {
        UserClaims {
            sub: username.to_string(),
            user_id: 0,
            role: Role::User,
            exp: 0,
            iat: 0,
        }
    }

    fn user(id: i32, username: &str) -> User {
        User {
            id,
            username: username.to_string(),
            password: String::new(),
            firstname: None,
            lastname: None,
            email: None,
            role: Role::User,
            created_at: Utc::now(),
        }
    }

    fn loan(id: i32, user_id: i32, book_id: i32, status: LoanStatus) -> Loan {
        Loan {
            id,
            book_id,
            user_id,
            status,
            loaned_at: Utc::now(),
            returned: None,
        }
    }

    fn users_with(id: i32, username: &'static str) -> MockUserStore {
        let mut users = MockUserStore::new();
        users
            .expect_find_by_username()
            .with(eq(username))
            .returning(move |_| Ok(Some(user(id, username))));
        users
    }

    fn service(loans: MockLoanStore, users: MockUserStore) -> LoansService {
        LoansService::new(Arc::new(loans), Arc::new(users))
    }

    #[tokio::test]
    async fn test_borrow_uses_caller_identity() {
        let mut loans = MockLoanStore::new();
        loans
            .expect_open()
            .with(eq(42), eq(7))
            .times(1)
            .returning(|user_id, book_id| Ok(loan(1, user_id, book_id, LoanStatus::Loaned)));

        let service = service(loans, users_with(42, "alice"));
        let created = assert_ok!(service.borrow(&claims("alice"), 7).await);
        assert_eq!(created.user_id, 42);
        assert_eq!(created.status, LoanStatus::Loaned);
    }

    #[tokio::test]
    async fn test_borrow_with_unknown_user_is_rejected() {
        let mut users = MockUserStore::new();
        users.expect_find_by_username().returning(|_| Ok(None));
        let mut loans = MockLoanStore::new();
        loans.expect_open().never();

        let service = service(loans, users);
        let err = assert_err!(service.borrow(&claims("ghost"), 7).await);
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_borrow_propagates_store_refusals() {
        let mut loans = MockLoanStore::new();
        loans.expect_open().returning(|_, _| {
            Err(AppError::NoCopiesAvailable("No copies of Book Dune available".into()))
        });

        let service = service(loans, users_with(1, "alice"));
        let err = assert_err!(service.borrow(&claims("alice"), 3).await);
        assert!(matches!(err, AppError::NoCopiesAvailable(_)));
    }

    #[tokio::test]
    async fn test_return_own_passes_borrower() {
        let mut loans = MockLoanStore::new();
        loans
            .expect_close()
            .with(eq(5), eq(Some(42)))
            .times(1)
            .returning(|id, _| Ok(loan(id, 42, 7, LoanStatus::Returned)));

        let service = service(loans, users_with(42, "alice"));
        let returned = assert_ok!(service.return_own(&claims("alice"), 5).await);
        assert_eq!(returned.status, LoanStatus::Returned);
    }

    #[tokio::test]
    async fn test_admin_return_skips_ownership() {
        let mut loans = MockLoanStore::new();
        loans
            .expect_close()
            .with(eq(5), eq(None::<i32>))
            .times(1)
            .returning(|id, _| Ok(loan(id, 42, 7, LoanStatus::Returned)));

        let service = service(loans, MockUserStore::new());
        assert_ok!(service.return_loan(5).await);
    }

    #[tokio::test]
    async fn test_list_own_is_scoped_to_caller() {
        let mut loans = MockLoanStore::new();
        loans
            .expect_search()
            .withf(|query, _| query.user_id == Some(42) && query.book_id == Some(9))
            .times(1)
            .returning(|_, _| Ok((vec![loan(1, 42, 9, LoanStatus::Loaned)], 1)));

        let service = service(loans, users_with(42, "alice"));
        let query = LoanQuery {
            user_id: Some(1),
            book_id: Some(9),
            ..Default::default()
        };
        let page = query.page_request().unwrap();
        let (items, total) = assert_ok!(service.list_own(&claims("alice"), query, &page).await);
        assert_eq!(total, 1);
        assert_eq!(items[0].user_id, 42);
    }

    #[tokio::test]
    async fn test_create_for_missing_user() {
        let mut users = MockUserStore::new();
        users.expect_exists().with(eq(99)).returning(|_| Ok(false));
        let mut loans = MockLoanStore::new();
        loans.expect_open().never();

        let service = service(loans, users);
        let err = assert_err!(
            service
                .create_for_user(CreateLoan { user_id: 99, book_id: 1 })
                .await
        );
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_create_for_existing_user() {
        let mut users = MockUserStore::new();
        users.expect_exists().with(eq(3)).returning(|_| Ok(true));
        let mut loans = MockLoanStore::new();
        loans
            .expect_open()
            .with(eq(3), eq(1))
            .times(1)
            .returning(|user_id, book_id| Ok(loan(10, user_id, book_id, LoanStatus::Loaned)));

        let service = service(loans, users);
        let created = assert_ok!(
            service
                .create_for_user(CreateLoan { user_id: 3, book_id: 1 })
                .await
        );
        assert_eq!(created.id, 10);
    }

    #[tokio::test]
    async fn test_backfill_rejects_inconsistent_record() {
        let mut loans = MockLoanStore::new();
        loans.expect_insert_record().never();

        let service = service(loans, MockUserStore::new());
        let record = LoanRecord {
            user_id: 1,
            book_id: 1,
            status: LoanStatus::Loaned,
            returned: Some(Utc::now()),
            loaned_at: None,
        };
        let err = assert_err!(service.backfill(record).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_backfill_inserts_record_as_given() {
        let mut loans = MockLoanStore::new();
        loans
            .expect_insert_record()
            .withf(|record| record.status == LoanStatus::Returned && record.book_id == 4)
            .times(1)
            .returning(|record| {
                let mut saved = loan(11, record.user_id, record.book_id, record.status);
                saved.returned = record.returned;
                Ok(saved)
            });

        let service = service(loans, MockUserStore::new());
        let record = LoanRecord {
            user_id: 2,
            book_id: 4,
            status: LoanStatus::Returned,
            returned: Some(Utc::now()),
            loaned_at: None,
        };
        let saved = assert_ok!(service.backfill(record).await);
        assert!(saved.returned.is_some());
    }
}
