pub mod address;
pub mod classifier;
pub mod config;
pub mod dialer;
pub mod dns;
pub mod error;
pub mod models;
pub mod ping;
pub mod prober;
pub mod server;
pub mod validator;

pub use address::{Address, Scheme};
pub use classifier::{ConnectProbe, ProxyClassifier, ProxyKind};
pub use config::{CheckOptions, Config};
pub use dialer::{DialStrategy, Route};
pub use error::{CheckError, DialError};
pub use models::{CheckRequest, CheckResult};
pub use prober::Prober;
pub use server::CheckServer;
