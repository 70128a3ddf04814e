use snafu::Snafu;

/// All failure modes surfaced by this crate. Variants map directly onto the
/// error kinds a caller needs to branch on (auth vs upstream vs not-found);
/// they are not a dumping ground for every `std::io::Error` call site.
#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid image reference: {reason}"))]
    InvalidReference { reason: String },

    #[snafu(display("failed to obtain a registry token: {reason}"))]
    AuthError { reason: String },

    #[snafu(display("registry rejected credentials for {namespace}/{repo}"))]
    Unauthorized { namespace: String, repo: String },

    #[snafu(display("registry returned {status}: {body}"))]
    RegistryError { status: u16, body: String },

    #[snafu(display("no manifest in the index matches the requested platform"))]
    PlatformNotFound,

    #[snafu(display("manifest is missing required field: {reason}"))]
    MalformedManifest { reason: String },

    #[snafu(display("layer blob is not gzip compressed"))]
    NotGzip,

    #[snafu(display("failed to decompress layer: {reason}"))]
    DecompressError { reason: String },

    #[snafu(display("layer stream ended before expected content was covered"))]
    TruncatedStream,

    #[snafu(display("{path} was not found"))]
    NotFound { path: String },

    #[snafu(display("catalog operation failed: {source}"))]
    CacheError { source: rusqlite::Error },

    #[snafu(display("entry already cataloged, overwrite was skipped"))]
    OverwriteSkipped,

    #[snafu(display("failed to send request to registry: {source}"))]
    Request { source: reqwest::Error },

    #[snafu(display("invalid url: {source}"))]
    Url { source: url::ParseError },

    #[snafu(display("failed to read response header: {source}"))]
    Header { source: reqwest::header::ToStrError },

    #[snafu(display("failed to parse json: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("failed to open catalog database at {path}: {source}"))]
    CatalogOpen {
        path: String,
        source: rusqlite::Error,
    },
}
