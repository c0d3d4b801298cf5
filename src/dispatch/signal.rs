//! Control signals: the explicit escape channel of a dispatch.
//!
//! Every dispatch-stage function returns [`Flow<T>`]. The error side carries
//! either a [`Signal`] (halt, redirect, forward, pass) or a real failure, so
//! `?` propagates both while the dispatcher can still tell them apart.

use std::fmt;

use crate::error::Error;
use crate::http::Response;

/// A non-error escape from the current handler or hook.
#[derive(Debug, Clone)]
pub enum Signal {
    /// Deliver this response as-is; remaining hooks skip.
    Halt(Response),
    /// Deliver this redirect; after-request hooks still run.
    Redirect(Response),
    /// Deliver the response produced by an internal re-dispatch.
    Forward(Response),
    /// Try the next matching route.
    Pass,
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Halt(_) => "halt",
            Signal::Redirect(_) => "redirect",
            Signal::Forward(_) => "forward",
            Signal::Pass => "pass",
        }
    }

    /// The response carried by the signal, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Signal::Halt(r) | Signal::Redirect(r) | Signal::Forward(r) => Some(r),
            Signal::Pass => None,
        }
    }
}

/// Why a dispatch stage stopped early.
#[derive(Debug)]
pub enum Interrupt {
    Signal(Signal),
    Failure(Error),
}

impl Interrupt {
    /// Collapse into an error for callers outside a dispatch.
    pub fn into_error(self) -> Error {
        match self {
            Interrupt::Failure(err) => err,
            Interrupt::Signal(signal) => Error::StraySignal(signal.name()),
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Interrupt::Signal(_))
    }
}

impl From<Error> for Interrupt {
    fn from(err: Error) -> Self {
        Interrupt::Failure(err)
    }
}

impl From<Signal> for Interrupt {
    fn from(signal: Signal) -> Self {
        Interrupt::Signal(signal)
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Signal(signal) => write!(f, "signal `{}`", signal.name()),
            Interrupt::Failure(err) => err.fmt(f),
        }
    }
}

/// Result of a dispatch stage.
pub type Flow<T> = Result<T, Interrupt>;
