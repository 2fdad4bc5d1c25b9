#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use loopvisor::{
    ChannelError, ChannelFactory, ChannelHandle, ChannelRef, Credential, Engine, EngineConfig,
    Event, EventKind, Observer, TaskInputs,
};

/// Credentials starting with `bad` are rejected; every other login yields a
/// handle that records its deliveries.
#[derive(Default)]
pub struct LoopbackFactory {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
}

struct LoopbackHandle {
    name: String,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl ChannelFactory for LoopbackFactory {
    async fn login(&self, credential: &Credential) -> Result<ChannelRef, ChannelError> {
        if credential.expose().starts_with("bad") {
            return Err(ChannelError::auth("session expired"));
        }
        Ok(Arc::new(LoopbackHandle {
            name: credential.expose().to_owned(),
            sent: Arc::clone(&self.sent),
        }))
    }
}

#[async_trait]
impl ChannelHandle for LoopbackHandle {
    async fn send(&self, _destination: &str, message: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((self.name.clone(), message.to_owned()));
        Ok(())
    }
}

pub fn inputs(credentials: &str, messages: &str) -> TaskInputs {
    TaskInputs {
        credentials: credentials.into(),
        messages: messages.into(),
        prefix: "hey".into(),
        suffix: "bye".into(),
        destination: "room-1".into(),
        delay_seconds: 0,
    }
}

pub async fn engine(factory: LoopbackFactory) -> Arc<Engine> {
    Engine::builder(EngineConfig::default(), Arc::new(factory))
        .build()
        .await
        .unwrap()
}

/// Next event of `kind`, skipping others. Panics after 60s (virtual or real).
pub async fn next_of(obs: &mut Observer, kind: EventKind) -> Arc<Event> {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let ev = obs.recv().await.expect("observer closed");
            if ev.kind == kind {
                return ev;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {kind:?} event"))
}
