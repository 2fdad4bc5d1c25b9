//! Scripted in-memory channel factory for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channels::{ChannelFactory, ChannelHandle, ChannelRef, TargetInfo};
use crate::error::ChannelError;
use crate::tasks::Credential;

/// How a handle answers `send`.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SendPlan {
    Ok,
    Fail,
    /// Fails the first `n` attempts, then succeeds.
    FailTimes(usize),
    Panic,
    Hang,
}

#[derive(Clone, Debug)]
pub(crate) struct Delivery {
    pub channel: String,
    pub message: String,
}

#[derive(Default)]
struct Record {
    deliveries: Vec<Delivery>,
    attempts: HashMap<String, usize>,
    logins: Vec<(String, Instant)>,
}

#[derive(Default)]
pub(crate) struct FakeFactory {
    rejected: Mutex<HashSet<String>>,
    plans: HashMap<String, SendPlan>,
    handles: Mutex<HashMap<String, Arc<FakeHandle>>>,
    record: Arc<Mutex<Record>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_login(self, name: &str) -> Self {
        self.set_login_ok(name, false);
        self
    }

    pub fn plan(mut self, name: &str, plan: SendPlan) -> Self {
        self.plans.insert(name.to_owned(), plan);
        self
    }

    pub fn set_login_ok(&self, name: &str, ok: bool) {
        let mut rejected = self.rejected.lock().unwrap();
        if ok {
            rejected.remove(name);
        } else {
            rejected.insert(name.to_owned());
        }
    }

    pub fn logins(&self) -> Vec<(String, Instant)> {
        self.record.lock().unwrap().logins.clone()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.record.lock().unwrap().deliveries.clone()
    }

    /// Send attempts made through any handle of `name`.
    pub fn attempts(&self, name: &str) -> usize {
        self.record
            .lock()
            .unwrap()
            .attempts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Latest handle issued for `name`.
    pub fn handle(&self, name: &str) -> Option<Arc<FakeHandle>> {
        self.handles.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ChannelFactory for FakeFactory {
    async fn login(&self, credential: &Credential) -> Result<ChannelRef, ChannelError> {
        let name = credential.expose().to_owned();
        self.record
            .lock()
            .unwrap()
            .logins
            .push((name.clone(), Instant::now()));

        if self.rejected.lock().unwrap().contains(&name) {
            return Err(ChannelError::auth("invalid session"));
        }

        let handle = Arc::new(FakeHandle {
            plan: self.plans.get(&name).copied().unwrap_or(SendPlan::Ok),
            name: name.clone(),
            session: CancellationToken::new(),
            record: Arc::clone(&self.record),
        });
        self.handles
            .lock()
            .unwrap()
            .insert(name, Arc::clone(&handle));
        Ok(handle)
    }
}

pub(crate) struct FakeHandle {
    name: String,
    plan: SendPlan,
    session: CancellationToken,
    record: Arc<Mutex<Record>>,
}

impl FakeHandle {
    /// Resolves the handle's `disconnected()` future.
    pub fn drop_session(&self) {
        self.session.cancel();
    }
}

#[async_trait]
impl ChannelHandle for FakeHandle {
    async fn send(&self, _destination: &str, message: &str) -> Result<(), ChannelError> {
        let attempt = {
            let mut record = self.record.lock().unwrap();
            let n = record.attempts.entry(self.name.clone()).or_default();
            *n += 1;
            *n
        };

        let ok = match self.plan {
            SendPlan::Ok => true,
            SendPlan::Fail => false,
            SendPlan::FailTimes(n) => attempt > n,
            SendPlan::Panic => panic!("send blew up"),
            SendPlan::Hang => futures::future::pending().await,
        };

        if ok {
            self.record.lock().unwrap().deliveries.push(Delivery {
                channel: self.name.clone(),
                message: message.to_owned(),
            });
            Ok(())
        } else {
            Err(ChannelError::send("rejected"))
        }
    }

    async fn disconnected(&self) {
        self.session.cancelled().await
    }

    async fn describe_target(&self, destination: &str) -> Option<TargetInfo> {
        Some(TargetInfo {
            name: Some(format!("room {destination}")),
        })
    }
}
