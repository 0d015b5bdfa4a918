//! The error taxonomy surfaced on stderr and mapped to process exit codes.
//!
//! The core never fails a job by returning an error from the orchestrator
//! process — outcomes are reported through the job's status file. `GolemError`
//! exists for the thin CLI layer: the handful of failure modes a command can
//! hit before (or instead of) touching a job directory at all.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    User,
    Validation,
    NotFound,
    Dependency,
    Timeout,
    Internal,
    Config,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::User => "user",
            Category::Validation => "validation",
            Category::NotFound => "not_found",
            Category::Dependency => "dependency",
            Category::Timeout => "timeout",
            Category::Internal => "internal",
            Category::Config => "config",
        }
    }

    /// The process exit code associated with this category, per the table
    /// in `spec.md` §6/§7.
    pub fn exit_code(self) -> i32 {
        match self {
            Category::User => 1,
            Category::Validation => 1,
            Category::NotFound => 3,
            Category::Dependency => 127,
            Category::Timeout => 1,
            Category::Internal => 1,
            Category::Config => 1,
        }
    }
}

#[derive(Debug)]
pub struct GolemError {
    pub category: Category,
    pub message: String,
}

impl GolemError {
    pub fn new(category: Category, message: impl Into<String>) -> Self {
        GolemError {
            category,
            message: message.into(),
        }
    }

    pub fn user(message: impl Into<String>) -> Self {
        Self::new(Category::User, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(Category::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Category::NotFound, message)
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(Category::Dependency, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(Category::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Category::Internal, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(Category::Config, message)
    }
}

impl fmt::Display for GolemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "err:{} {}", self.category.as_str(), self.message)
    }
}

impl std::error::Error for GolemError {}
