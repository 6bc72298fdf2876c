use super::{transfer::Transfer, Assemble, Operation, Status};
use crate::error::{Error, Result};

/// A non-blocking operation that owns the value it will yield. The value is
/// assembled once, when the underlying transfer completes, and can then be
/// read any number of times. If assembling fails, the failure is kept and
/// reported again by every later call.
pub struct Reply<'c, T> {
    transfer: Transfer<'c>,
    assemble: Option<Assemble<'c, T>>,
    value: Option<T>,
    failure: Option<String>,
}

impl<'c, T> Reply<'c, T> {
    pub(crate) fn new(transfer: Transfer<'c>, assemble: Assemble<'c, T>) -> Self {
        Self {
            transfer,
            assemble: Some(assemble),
            value: None,
            failure: None,
        }
    }

    /// Block until the value is available and return a copy of it. The first
    /// call forces completion; later calls return the same value without
    /// touching the transport.
    pub fn get(&mut self) -> Result<T>
    where
        T: Clone,
    {
        self.wait()?;
        self.value.clone().ok_or(Error::Cancelled)
    }

    /// Block until the value is available and move it out of the reply.
    pub fn into_value(mut self) -> Result<T> {
        self.wait()?;
        self.value.take().ok_or(Error::Cancelled)
    }

    fn settle(&mut self) -> Result<()> {
        if self.transfer.status() == Status::Completed {
            if let Some(assemble) = self.assemble.take() {
                match assemble(self.transfer.take_parts()) {
                    Ok(value) => self.value = Some(value),
                    Err(e) => self.failure = Some(e.to_string()),
                }
            }
        }
        match &self.failure {
            Some(failure) => Err(Error::Assembly(failure.clone())),
            None => Ok(()),
        }
    }
}

impl<'c, T> Operation for Reply<'c, T> {
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
