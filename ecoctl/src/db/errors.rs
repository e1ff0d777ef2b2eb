use thiserror::Error;

/// Store failures the API layer maps to a status code.
///
/// The schema has no foreign keys, so only unique and check constraints are singled out.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Row not found")]
    NotFound,

    /// A natural key is already taken, e.g. a second budget with the same name
    #[error("Unique constraint violation: {message}")]
    UniqueViolation { constraint: Option<String>, message: String },

    /// A column value fell outside its allowed range or enum
    #[error("Check constraint violation: {message}")]
    CheckViolation { constraint: Option<String>, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let sqlx::Error::Database(db_err) = &err else {
            return match err {
                sqlx::Error::RowNotFound => DbError::NotFound,
                other => DbError::Other(other.into()),
            };
        };

        let constraint = db_err.constraint().map(str::to_string);
        let message = db_err.message().to_string();
        if db_err.is_unique_violation() {
            DbError::UniqueViolation { constraint, message }
        } else if db_err.is_check_violation() {
            DbError::CheckViolation { constraint, message }
        } else {
            DbError::Other(err.into())
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
