//! A2DP offload bookkeeping for one logical link
//!
//! At most one channel per link can have its media stream offloaded to the
//! controller. Start and stop are asynchronous: the vendor command is sent
//! right away and the outcome arrives with its Command Complete.

use log::{debug, warn};

use super::types::{ChannelId, L2capError, L2capResult};

/// Offload state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum A2dpOffloadStatus {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

#[derive(Debug, Default)]
pub struct A2dpOffloadManager {
    status: A2dpOffloadStatus,
    offloaded_cid: Option<ChannelId>,
}

impl A2dpOffloadManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> A2dpOffloadStatus {
        self.status
    }

    pub fn offloaded_cid(&self) -> Option<ChannelId> {
        self.offloaded_cid
    }

    pub fn is_offloaded(&self, local_cid: ChannelId) -> bool {
        self.offloaded_cid == Some(local_cid)
            && matches!(self.status, A2dpOffloadStatus::Started | A2dpOffloadStatus::Stopping)
    }

    /// Reserve the link for offloading `local_cid`
    pub fn begin_start(&mut self, local_cid: ChannelId) -> L2capResult<()> {
        match self.status {
            A2dpOffloadStatus::Starting | A2dpOffloadStatus::Stopping => Err(L2capError::InProgress),
            A2dpOffloadStatus::Started => Err(L2capError::AlreadyStarted),
            A2dpOffloadStatus::Stopped => {
                debug!("Starting A2DP offload on CID 0x{:04X}", local_cid);
                self.status = A2dpOffloadStatus::Starting;
                self.offloaded_cid = Some(local_cid);
                Ok(())
            }
        }
    }

    /// Returns false when `local_cid` is not offloaded and there is nothing to stop
    pub fn begin_stop(&mut self, local_cid: ChannelId) -> L2capResult<bool> {
        match self.status {
            A2dpOffloadStatus::Starting | A2dpOffloadStatus::Stopping => Err(L2capError::InProgress),
            A2dpOffloadStatus::Stopped => Ok(false),
            A2dpOffloadStatus::Started if self.offloaded_cid != Some(local_cid) => Ok(false),
            A2dpOffloadStatus::Started => {
                debug!("Stopping A2DP offload on CID 0x{:04X}", local_cid);
                self.status = A2dpOffloadStatus::Stopping;
                Ok(true)
            }
        }
    }

    /// Undo a start or stop whose command never reached the controller
    pub fn abort(&mut self) {
        match self.status {
            A2dpOffloadStatus::Starting => {
                self.status = A2dpOffloadStatus::Stopped;
                self.offloaded_cid = None;
            }
            A2dpOffloadStatus::Stopping => self.status = A2dpOffloadStatus::Started,
            _ => {}
        }
    }

    pub fn on_start_complete(&mut self, success: bool) {
        if self.status != A2dpOffloadStatus::Starting {
            warn!("A2DP offload start completed in state {:?}", self.status);
            return;
        }
        if success {
            self.status = A2dpOffloadStatus::Started;
        } else {
            self.status = A2dpOffloadStatus::Stopped;
            self.offloaded_cid = None;
        }
    }

    pub fn on_stop_complete(&mut self, success: bool) {
        if self.status != A2dpOffloadStatus::Stopping {
            warn!("A2DP offload stop completed in state {:?}", self.status);
            return;
        }
        if success {
            self.status = A2dpOffloadStatus::Stopped;
            self.offloaded_cid = None;
        } else {
            self.status = A2dpOffloadStatus::Started;
        }
    }

    /// Forget the offload when its channel goes away
    pub fn channel_closed(&mut self, local_cid: ChannelId) {
        if self.offloaded_cid == Some(local_cid) {
            self.status = A2dpOffloadStatus::Stopped;
            self.offloaded_cid = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_stop() {
        let mut manager = A2dpOffloadManager::new();
        manager.begin_start(0x40).unwrap();
        assert!(matches!(manager.begin_start(0x40), Err(L2capError::InProgress)));

        manager.on_start_complete(true);
        assert!(manager.is_offloaded(0x40));
        assert!(matches!(manager.begin_start(0x41), Err(L2capError::AlreadyStarted)));

        assert!(!manager.begin_stop(0x41).unwrap());
        assert!(manager.begin_stop(0x40).unwrap());
        manager.on_stop_complete(true);
        assert_eq!(manager.status(), A2dpOffloadStatus::Stopped);
        assert_eq!(manager.offloaded_cid(), None);
    }

    #[test]
    fn failed_start_returns_to_stopped() {
        let mut manager = A2dpOffloadManager::new();
        manager.begin_start(0x40).unwrap();
        manager.on_start_complete(false);
        assert_eq!(manager.status(), A2dpOffloadStatus::Stopped);
        assert!(manager.begin_start(0x40).is_ok());
    }

    #[test]
    fn stop_when_stopped_is_a_no_op() {
        let mut manager = A2dpOffloadManager::new();
        assert!(!manager.begin_stop(0x40).unwrap());
    }
}
