use snafu::prelude::*;
use std::path::PathBuf;

use crate::storage::StorageError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to load component `{name}` from {path}: {reason}"))]
    Load {
        name: String,
        path: String,
        reason: String,
    },

    #[snafu(display("Component `{name}` failed to initialize: {reason}"))]
    Init { name: String, reason: String },

    #[snafu(display("No renderable route for `{path}`: {reason}"))]
    RouteResolution { path: String, reason: String },

    #[snafu(display("Navigation to `{path}` aborted by hook: {reason}"))]
    NavigationHook { path: String, reason: String },

    #[snafu(display("Invalid route pattern `{pattern}`: {reason}"))]
    InvalidPattern { pattern: String, reason: String },

    #[snafu(display("Durable storage failed for key `{key}`: {source}"))]
    Persistence { key: String, source: StorageError },

    #[snafu(display("Listener for `{event}` failed: {reason}"))]
    Listener { event: String, reason: String },

    #[snafu(display("Application has no routes registered"))]
    NoRoutes,

    #[snafu(display("Application already started"))]
    AlreadyStarted,

    #[snafu(display("Request to {endpoint} failed: {reason}"))]
    Transport { endpoint: String, reason: String },

    #[snafu(display("Request to {endpoint} returned HTTP {status}"))]
    ApiStatus { endpoint: String, status: u16 },

    #[snafu(display("Response from {endpoint} is not valid JSON: {source}"))]
    ApiDecode {
        endpoint: String,
        source: serde_json::Error,
    },

    #[snafu(display("Failed to read config from {}: {source}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config {}: {source}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
