mod bytes;
mod config;
mod dispatcher;
mod errors;
mod logging;
mod timer;

pub use bytes::ByteString;
pub use config::DispatchConfig;
pub use dispatcher::{Evertick, EvertickBuilder};
pub use errors::EvertickError;
pub use logging::{DispatchLog, FacadeLog, LogLevel, StderrLog};
pub use timer::{TimerReactor, WaitStatus, WaitTimer};

pub mod prelude {
    pub use super::{
        ByteString, DispatchConfig, DispatchLog, Evertick, EvertickBuilder, EvertickError,
        TimerReactor, WaitStatus, WaitTimer,
    };
}
