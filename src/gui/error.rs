use std::{error::Error, fmt::Display, sync::mpsc};

#[derive(Debug)]
pub enum GuiError {
    FmtError(std::fmt::Error),
    IOError(std::io::Error),
    MPSCSendError,
    MPSCRecvError(mpsc::RecvError),
    JoinError,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuiError::FmtError(e) => write!(f, "formatting failed: {e}"),
            GuiError::IOError(e) => write!(f, "terminal error: {e}"),
            GuiError::MPSCSendError => write!(f, "worker thread hung up"),
            GuiError::MPSCRecvError(e) => write!(f, "worker thread hung up: {e}"),
            GuiError::JoinError => write!(f, "worker thread panicked"),
        }
    }
}

impl Error for GuiError {}

impl From<std::fmt::Error> for GuiError {
    fn from(value: std::fmt::Error) -> Self {
        Self::FmtError(value)
    }
}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl<T> From<mpsc::SendError<T>> for GuiError {
    fn from(_: mpsc::SendError<T>) -> Self {
        Self::MPSCSendError
    }
}

impl From<mpsc::RecvError> for GuiError {
    fn from(value: mpsc::RecvError) -> Self {
        Self::MPSCRecvError(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_the_cause() {
        let err = GuiError::from(std::io::Error::new(std::io::ErrorKind::Other, "no tty"));
        assert!(err.to_string().contains("no tty"));

        let (tx, rx) = mpsc::channel::<u8>();
        drop(rx);
        let err = GuiError::from(tx.send(1).unwrap_err());
        assert!(matches!(err, GuiError::MPSCSendError));
    }
}
