#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("{0}")]
    InvalidAdUnit(String),
    #[error("{0}")]
    InvalidAnswer(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Ineligible(#[from] crate::eligibility::Ineligible),
    #[error("{0}")]
    InvalidTheme(String),
}
