//! Data models for Bibliotheca

pub mod author;
pub mod book;
pub mod loan;
pub mod pagination;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::Book;
pub use loan::{Loan, LoanStatus, LoanTransition};
pub use pagination::{PageRequest, SortDirection};
pub use user::{Role, User, UserClaims};
