use std::fmt;

use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of a probe attempt that failed with a transport error.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ProbeStage {
    ReceiveSocket,
    SendSocket,
    Ttl,
    ReceiveTimeout,
    Bind,
    Send,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            ProbeStage::ReceiveSocket => "open ICMP receive socket",
            ProbeStage::SendSocket => "open UDP send socket",
            ProbeStage::Ttl => "set TTL",
            ProbeStage::ReceiveTimeout => "set receive timeout",
            ProbeStage::Bind => "bind receive socket",
            ProbeStage::Send => "send probe",
        };
        f.write_str(stage)
    }
}

#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("destination address is required")]
    MissingDestination,
    #[error("the options are already bound to an active trace")]
    AlreadyBound,
    #[error("failed to {stage}, reason: {source}")]
    Transport {
        stage: ProbeStage,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}

impl Error {
    pub(crate) fn transport(stage: ProbeStage) -> impl FnOnce(std::io::Error) -> Self {
        move |source| Error::Transport { stage, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
