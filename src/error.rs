use thiserror::Error;

/// crate specific Result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate specific Error enum
#[derive(Error, Debug)]
pub enum Error {
    /// [std::io::Error]
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A required header directive was never seen before the payload started
    #[error("missing header directive: {}", .0)]
    MissingDirective(&'static str),

    /// The FIELDS/SIZE/TYPE/COUNT directives do not describe the same number of fields
    #[error(
        "header field count mismatch: fields={fields}, sizes={sizes}, types={types}, counts={counts}"
    )]
    FieldCountMismatch {
        fields: usize,
        sizes: usize,
        types: usize,
        counts: usize,
    },

    /// A directive value could not be parsed
    #[error("invalid value for header directive {directive}: {value:?}")]
    InvalidDirective {
        directive: &'static str,
        value: String,
    },

    /// The header is structurally complete but describes no loadable cloud
    #[error("invalid header: fields must be non-empty, width and point count non-zero")]
    InvalidHeader,

    /// The header does not declare all of the x, y and z fields
    #[error("header is missing one or more of the x, y, z position fields")]
    MissingPositionFields,

    /// The first four bytes of a LAS file were not "LASF"
    #[error("invalid LAS file signature: {:?}", .0)]
    InvalidSignature([u8; 4]),

    /// Only LAS versions 1.2 through 1.4 are supported
    #[error("unsupported LAS version: {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// The declared point or byte count does not match the available bytes
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSizeMismatch { expected: usize, actual: usize },

    /// A compressed stream ended in the middle of a control unit
    #[error("truncated compressed stream")]
    TruncatedStream,

    /// A back-reference pointed behind the start of the output
    #[error("invalid back-reference: offset {offset} with only {produced} bytes produced")]
    InvalidBackReference { offset: usize, produced: usize },

    /// The output buffer cannot hold the unit about to be decoded
    #[error("insufficient output capacity for compressed stream")]
    InsufficientCapacity,

    /// The decompressed length did not match the declared uncompressed size
    #[error("decompressed size mismatch: expected {expected} bytes, got {actual}")]
    DecompressedSizeMismatch { expected: usize, actual: usize },

    /// The DATA directive named a representation this crate does not know
    #[error("unsupported PCD data type: {:?}", .0)]
    UnsupportedDataType(String),

    /// Point data record formats above 10 are not defined by the LAS spec
    #[error("unsupported LAS point record format: {}", .0)]
    UnsupportedPointFormat(u8),
}
