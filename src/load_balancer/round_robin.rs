//! Round-robin load balancing strategy.

use std::sync::{Mutex, PoisonError};

use crate::load_balancer::backend::Endpoint;

/// Error building a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("no backends to dispatch to")]
    NoBackends,
}

/// Round-robin selector over a fixed backend list.
///
/// The cursor is only touched inside [`RoundRobin::next`]; the lock is
/// released before the caller does any I/O with the returned endpoint.
#[derive(Debug)]
pub struct RoundRobin {
    endpoints: Vec<Endpoint>,
    cursor: Mutex<usize>,
}

impl RoundRobin {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, DispatchError> {
        if endpoints.is_empty() {
            return Err(DispatchError::NoBackends);
        }
        Ok(Self {
            endpoints,
            cursor: Mutex::new(0),
        })
    }

    /// Endpoint at the cursor; advances the cursor by one.
    pub fn next(&self) -> &Endpoint {
        let index = {
            // The cursor is a plain index, so a poisoned lock still holds a valid value.
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            let index = *cursor;
            *cursor = (index + 1) % self.endpoints.len();
            index
        };
        &self.endpoints[index]
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
