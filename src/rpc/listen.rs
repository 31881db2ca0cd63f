//! Scoped blocking-listen mode.
//!
//! While blocking listen is on, the simulation waits for each request in
//! its main loop instead of polling. That runs much faster, but a simulation
//! left in blocking mode freezes once the controller stops sending. The
//! guard here turns it back off on every exit path.

use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use crate::rpc::client::RpcClient;
use crate::rpc::transport::Transport;

/// Remote method toggling blocking listen.
pub const SET_BLOCKING_LISTEN: &str = "setBlockingListen";

/// Keeps the simulation in blocking-listen mode while alive.
///
/// Derefs to the client, so calls can be made through the guard. On drop it
/// sends `setBlockingListen(blocking=false)` with connection-failure retry
/// disabled, so an endpoint that is already gone does not hang teardown.
pub struct BlockingListenGuard<'a, T: Transport> {
    client: &'a mut RpcClient<T>,
}

impl<'a, T: Transport> BlockingListenGuard<'a, T> {
    pub(crate) fn new(client: &'a mut RpcClient<T>) -> Self {
        Self { client }
    }
}

impl<T: Transport> Deref for BlockingListenGuard<'_, T> {
    type Target = RpcClient<T>;

    fn deref(&self) -> &Self::Target {
        self.client
    }
}

impl<T: Transport> DerefMut for BlockingListenGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client
    }
}

impl<T: Transport> Drop for BlockingListenGuard<'_, T> {
    fn drop(&mut self) {
        debug!("Leaving blocking listen on {}", self.client.endpoint());
        let result = self
            .client
            .method(SET_BLOCKING_LISTEN)
            .arg("blocking", false)
            .no_retry()
            .invoke();
        if let Err(e) = result {
            warn!("Failed to turn off blocking listen: {}", e);
        }
    }
}
