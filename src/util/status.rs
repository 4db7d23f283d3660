use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    // Rejected locally, before any remote call
    ConflictingModeSpec,
    InvalidModeForCreate,
    AmbiguousSchemaSource,
    MissingSchemaSource,
    EmptyColumnSet,
    InvalidArgument,

    // Surfaced from the table service
    NotFound,
    PermissionDenied,
    SchemaConflict,
    InvalidState,
    NotSupported,
    IOError,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    pub fn new(code: Code, msg: impl Into<String>) -> Self {
        Status {
            code,
            message: Some(msg.into()),
        }
    }

    pub fn conflicting_mode_spec() -> Self {
        Status::new(
            Code::ConflictingModeSpec,
            "keep_open is deprecated and cannot be combined with mode",
        )
    }

    pub fn invalid_mode_for_create(msg: impl Into<String>) -> Self {
        Status::new(Code::InvalidModeForCreate, msg)
    }

    pub fn ambiguous_schema_source() -> Self {
        Status::new(
            Code::AmbiguousSchemaSource,
            "exactly one of columns or init_from must be given, got both",
        )
    }

    pub fn missing_schema_source() -> Self {
        Status::new(
            Code::MissingSchemaSource,
            "exactly one of columns or init_from must be given, got neither",
        )
    }

    pub fn empty_column_set(msg: impl Into<String>) -> Self {
        Status::new(Code::EmptyColumnSet, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Status::new(Code::InvalidArgument, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Status::new(Code::NotFound, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Status::new(Code::PermissionDenied, msg)
    }

    pub fn schema_conflict(msg: impl Into<String>) -> Self {
        Status::new(Code::SchemaConflict, msg)
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Status::new(Code::InvalidState, msg)
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Status::new(Code::NotSupported, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Status::new(Code::IOError, msg)
    }

    pub fn timed_out(msg: impl Into<String>) -> Self {
        Status::new(Code::TimedOut, msg)
    }

    /// True for the codes raised by local configuration checks.
    ///
    /// A configuration error is always returned before the table service is
    /// contacted.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.code,
            Code::ConflictingModeSpec
                | Code::InvalidModeForCreate
                | Code::AmbiguousSchemaSource
                | Code::MissingSchemaSource
                | Code::EmptyColumnSet
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Code::NotFound
    }

    pub fn is_invalid_state(&self) -> bool {
        self.code == Code::InvalidState
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{:?}: {}", self.code, msg),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl std::error::Error for Status {}

pub type Result<T> = std::result::Result<T, Status>;
