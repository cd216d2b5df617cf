/// Status code type alias.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Common status codes (0-999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const DATA_CORRUPTION: status_code_t = 2;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const INVALID_FORMAT: status_code_t = 33;
    pub const FAULT_INJECTION: status_code_t = 70;
    pub const CONFIG_PARSE_ERROR: status_code_t = 71;
    pub const FOUND_BUG: status_code_t = 998;
    pub const UNKNOWN: status_code_t = 999;
}

/// Substrate transaction status codes (1xxx).
pub mod TransactionCode {
    use super::status_code_t;

    pub const FAILED: status_code_t = 1000;
    pub const CONFLICT: status_code_t = 1001;
    pub const TOO_OLD: status_code_t = 1003;
    pub const NETWORK_ERROR: status_code_t = 1004;
    pub const CANCELED: status_code_t = 1005;
    pub const MAYBE_COMMITTED: status_code_t = 1006;
}

/// Metadata service status codes (3xxx).
pub mod MetaCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 3000;
    pub const NOT_DIRECTORY: status_code_t = 3003;
    pub const IS_DIRECTORY: status_code_t = 3006;
    pub const EXISTS: status_code_t = 3007;
    pub const INCONSISTENT: status_code_t = 3009;
    pub const INODE_ID_ALLOC_FAILED: status_code_t = 3012;
    pub const NAME_TOO_LONG: status_code_t = 3017;
    pub const NOT_FORMATTED: status_code_t = 3020;
    pub const BACKEND_NOT_FOUND: status_code_t = 3021;
    pub const SERVICE_CLOSED: status_code_t = 3022;
    pub const OPERATION_TIMEOUT: status_code_t = 3203;
    pub const FOUND_BUG: status_code_t = 3999;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCodeType {
    Invalid = -1,
    Common = 0,
    Transaction = 1,
    Meta = 3,
}

/// Determine the type/category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        1000..=1999 => StatusCodeType::Transaction,
        3000..=3999 => StatusCodeType::Meta,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        // Common
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::DATA_CORRUPTION => "DataCorruption",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::INVALID_FORMAT => "InvalidFormat",
        StatusCode::FAULT_INJECTION => "FaultInjection",
        StatusCode::CONFIG_PARSE_ERROR => "ConfigParseError",
        StatusCode::FOUND_BUG => "FoundBug",
        StatusCode::UNKNOWN => "Unknown",

        // Transaction
        TransactionCode::FAILED => "Transaction::Failed",
        TransactionCode::CONFLICT => "Transaction::Conflict",
        TransactionCode::TOO_OLD => "Transaction::TooOld",
        TransactionCode::NETWORK_ERROR => "Transaction::NetworkError",
        TransactionCode::CANCELED => "Transaction::Canceled",
        TransactionCode::MAYBE_COMMITTED => "Transaction::MaybeCommitted",

        // Meta
        MetaCode::NOT_FOUND => "Meta::NotFound",
        MetaCode::NOT_DIRECTORY => "Meta::NotDirectory",
        MetaCode::IS_DIRECTORY => "Meta::IsDirectory",
        MetaCode::EXISTS => "Meta::Exists",
        MetaCode::INCONSISTENT => "Meta::Inconsistent",
        MetaCode::INODE_ID_ALLOC_FAILED => "Meta::InodeIdAllocFailed",
        MetaCode::NAME_TOO_LONG => "Meta::NameTooLong",
        MetaCode::NOT_FORMATTED => "Meta::NotFormatted",
        MetaCode::BACKEND_NOT_FOUND => "Meta::BackendNotFound",
        MetaCode::SERVICE_CLOSED => "Meta::ServiceClosed",
        MetaCode::OPERATION_TIMEOUT => "Meta::OperationTimeout",
        MetaCode::FOUND_BUG => "Meta::FoundBug",

        _ => "UnknownStatusCode",
    }
}

/// Convert a status code to the corresponding POSIX errno value, for
/// filesystem front ends that surface metadata errors to the kernel.
pub fn to_errno(code: status_code_t) -> i32 {
    match code {
        c if c == StatusCode::INVALID_ARG => libc::EINVAL,
        c if c == StatusCode::NOT_IMPLEMENTED => libc::ENOSYS,

        c if c == TransactionCode::NETWORK_ERROR || c == TransactionCode::FAILED => libc::EAGAIN,
        c if c == TransactionCode::CANCELED => libc::EINTR,
        c if c == MetaCode::OPERATION_TIMEOUT => libc::ETIMEDOUT,

        c if c == MetaCode::NOT_FOUND => libc::ENOENT,
        c if c == MetaCode::NOT_DIRECTORY => libc::ENOTDIR,
        c if c == MetaCode::IS_DIRECTORY => libc::EISDIR,
        c if c == MetaCode::EXISTS => libc::EEXIST,
        c if c == MetaCode::NAME_TOO_LONG => libc::ENAMETOOLONG,
        c if c == MetaCode::NOT_FORMATTED => libc::ENODEV,
        c if c == MetaCode::SERVICE_CLOSED => libc::ESHUTDOWN,

        _ => libc::EIO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_values() {
        assert_eq!(StatusCode::OK, 0);
        assert_eq!(StatusCode::UNKNOWN, 999);
        assert_eq!(TransactionCode::FAILED, 1000);
        assert_eq!(MetaCode::NOT_FOUND, 3000);
    }

    #[test]
    fn test_type_of() {
        assert_eq!(type_of(StatusCode::OK), StatusCodeType::Common);
        assert_eq!(type_of(TransactionCode::MAYBE_COMMITTED), StatusCodeType::Transaction);
        assert_eq!(type_of(MetaCode::NOT_FORMATTED), StatusCodeType::Meta);
        assert_eq!(type_of(2005), StatusCodeType::Invalid);
        assert_eq!(type_of(65535), StatusCodeType::Invalid);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(StatusCode::INVALID_ARG), "InvalidArg");
        assert_eq!(to_string(TransactionCode::CONFLICT), "Transaction::Conflict");
        assert_eq!(to_string(MetaCode::NOT_FORMATTED), "Meta::NotFormatted");
        assert_eq!(to_string(12345), "UnknownStatusCode");
    }

    #[test]
    fn test_to_errno() {
        assert_eq!(to_errno(StatusCode::OK), libc::EIO);
        assert_eq!(to_errno(StatusCode::INVALID_ARG), libc::EINVAL);
        assert_eq!(to_errno(MetaCode::NOT_FOUND), libc::ENOENT);
        assert_eq!(to_errno(MetaCode::EXISTS), libc::EEXIST);
        assert_eq!(to_errno(MetaCode::IS_DIRECTORY), libc::EISDIR);
        assert_eq!(to_errno(TransactionCode::NETWORK_ERROR), libc::EAGAIN);
        assert_eq!(to_errno(TransactionCode::MAYBE_COMMITTED), libc::EIO);
    }
}
