use super::{transfer::Transfer, Operation, Parts, Status};
use crate::error::{Error, Result};

/// Writes the gathered messages into the caller's buffer.
pub(crate) type Fill<'c, T> = Box<dyn FnOnce(Parts, &mut T) -> Result<()> + 'c>;

/// A non-blocking operation that writes into a buffer supplied by the
/// caller. The buffer stays mutably borrowed until the request is dropped,
/// so it cannot be read before the operation is known to be complete. A
/// failed fill is kept, and the buffer is then left untouched.
pub struct Request<'c, 'b, T> {
    transfer: Transfer<'c>,
    fill: Option<Fill<'c, T>>,
    buffer: &'b mut T,
    failure: Option<String>,
}

impl<'c, 'b, T> Request<'c, 'b, T> {
    pub(crate) fn new(transfer: Transfer<'c>, fill: Fill<'c, T>, buffer: &'b mut T) -> Self {
        Self {
            transfer,
            fill: Some(fill),
            buffer,
            failure: None,
        }
    }

    /// A request whose completion replaces the buffer contents with the
    /// assembled value.
    pub(crate) fn replacing<F>(transfer: Transfer<'c>, assemble: F, buffer: &'b mut T) -> Self
    where
        F: FnOnce(Parts) -> Result<T> + 'c,
        T: 'c,
    {
        let fill: Fill<'c, T> = Box::new(move |parts, buffer| {
            *buffer = assemble(parts)?;
            Ok(())
        });
        Self::new(transfer, fill, buffer)
    }

    fn settle(&mut self) -> Result<()> {
        if self.transfer.status() == Status::Completed {
            if let Some(fill) = self.fill.take() {
                if let Err(e) = fill(self.transfer.take_parts(), self.buffer) {
                    self.failure = Some(e.to_string());
                }
            }
        }
        match &self.failure {
            Some(failure) => Err(Error::Assembly(failure.clone())),
            None => Ok(()),
        }
    }
}

impl<'c, 'b, T> Operation for Request<'c, 'b, T> {
    fn poll(&mut self) -> Result<bool> {
        let done = self.transfer.poll()?;
        self.settle()?;
        Ok(done)
    }

    fn wait(&mut self) -> Result<()> {
        self.transfer.wait()?;
        self.settle()
    }

    fn cancel(&mut self) -> Result<()> {
        self.transfer.cancel()
    }

    fn status(&self) -> Status {
        self.transfer.status()
    }
}
