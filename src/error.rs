//! Unified application error model and mapping helpers.
//! This module provides a common error enum used across the auth, storage and
//! HTTP layers, along with the route-boundary policy mappers (HTTP status and
//! safe redirect target).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    DuplicateUser { code: String, message: String },
    InvalidCredentials { code: String, message: String },
    Unauthenticated { code: String, message: String },
    Provider { code: String, message: String },
    Store { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::DuplicateUser { code, .. }
            | AppError::InvalidCredentials { code, .. }
            | AppError::Unauthenticated { code, .. }
            | AppError::Provider { code, .. }
            | AppError::Store { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::DuplicateUser { message, .. }
            | AppError::InvalidCredentials { message, .. }
            | AppError::Unauthenticated { message, .. }
            | AppError::Provider { message, .. }
            | AppError::Store { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::UserInput { code: code.into(), message: msg.into() }
    }
    pub fn not_found<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::NotFound { code: code.into(), message: msg.into() }
    }
    pub fn duplicate_user<M: Into<String>>(msg: M) -> Self {
        AppError::DuplicateUser { code: "duplicate_username".into(), message: msg.into() }
    }
    pub fn invalid_credentials() -> Self {
        AppError::InvalidCredentials {
            code: "invalid_credentials".into(),
            message: "unknown username or wrong password".into(),
        }
    }
    pub fn unauthenticated() -> Self {
        AppError::Unauthenticated {
            code: "unauthenticated".into(),
            message: "no valid session".into(),
        }
    }
    pub fn provider<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Provider { code: code.into(), message: msg.into() }
    }
    pub fn store<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Store { code: code.into(), message: msg.into() }
    }
    pub fn internal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Internal { code: code.into(), message: msg.into() }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::DuplicateUser { .. } => 409,
            AppError::InvalidCredentials { .. } => 401,
            AppError::Unauthenticated { .. } => 401,
            AppError::Provider { .. } => 502,
            AppError::Store { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }

    /// Safe page the route boundary redirects to after logging this error.
    /// Nothing propagates to the client as a raw failure.
    pub fn redirect_target(&self) -> &'static str {
        match self {
            AppError::DuplicateUser { .. } | AppError::UserInput { .. } => "/register",
            AppError::InvalidCredentials { .. }
            | AppError::Unauthenticated { .. }
            | AppError::Provider { .. } => "/login",
            AppError::NotFound { .. } | AppError::Store { .. } | AppError::Internal { .. } => "/",
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Preserve a typed error when one is buried in the chain
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Internal { code: "internal".into(), message: other.to_string() },
        }
    }
}
