//! Error codes for Hibiki diagnostics.

/// Error codes for categorizing diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Construction errors (H0001 - H0099)
    MalformedPath,
    PathSyntax,
    RootNotWritable,

    // Resolution errors (H0100 - H0199)
    Resolution,
    FunctionFailed,
    UnknownFunction,

    // Runtime limits (H0200 - H0299)
    RuntimeLimit,

    // User errors (H0300 - H0399)
    UserThrown,
    UnhandledError,

    // Structural errors (H0400 - H0499)
    Cycle,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            // Construction
            ErrorCode::MalformedPath => "H0001",
            ErrorCode::PathSyntax => "H0002",
            ErrorCode::RootNotWritable => "H0003",

            // Resolution
            ErrorCode::Resolution => "H0100",
            ErrorCode::FunctionFailed => "H0101",
            ErrorCode::UnknownFunction => "H0102",

            // Limits
            ErrorCode::RuntimeLimit => "H0200",

            // User
            ErrorCode::UserThrown => "H0300",
            ErrorCode::UnhandledError => "H0301",

            // Structural
            ErrorCode::Cycle => "H0400",
        }
    }

    /// Get a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::MalformedPath => "path is malformed",
            ErrorCode::PathSyntax => "string path could not be parsed",
            ErrorCode::RootNotWritable => "path root cannot be assigned",
            ErrorCode::Resolution => "value could not be resolved",
            ErrorCode::FunctionFailed => "function call failed",
            ErrorCode::UnknownFunction => "no function with this name",
            ErrorCode::RuntimeLimit => "runtime limit exceeded",
            ErrorCode::UserThrown => "error thrown by a handler",
            ErrorCode::UnhandledError => "error was not handled",
            ErrorCode::Cycle => "value graph contains a cycle",
        }
    }

    /// Get a suggested fix for the error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ErrorCode::RootNotWritable => {
                Some("assign through $, $state, $c or $args instead")
            }
            ErrorCode::RuntimeLimit => {
                Some("check for handlers that fire or call each other recursively")
            }
            ErrorCode::UnhandledError => Some("add an `error` handler to catch it"),
            ErrorCode::Cycle => Some("store a reference (lvalue) instead of the container itself"),
            _ => None,
        }
    }
}
