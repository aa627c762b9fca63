//! Shared fixtures for the integration suite.
//!
//! Each test binary compiles its own copy, so not every helper is used by
//! every binary.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use snacline::{
    CommandType,
    DispatchError,
    DispatchStage,
    ListenerError,
    RawCommand,
    RequestListener,
    RequestResponseEvent,
    RequestTimeoutEvent,
    SnacFrame,
    SnacRequest,
    SnacTransport,
    TimeoutReason,
};

/// Transport double recording every frame written and every reported error.
#[derive(Default)]
pub struct TestTransport {
    pub sent: Mutex<Vec<SnacFrame>>,
    pub errors: Mutex<Vec<(DispatchStage, String)>>,
}

impl TestTransport {
    pub fn sent_count(&self) -> usize { self.sent.lock().unwrap().len() }

    pub fn sent_request_ids(&self) -> Vec<u32> {
        self.sent.lock().unwrap().iter().map(|f| f.request_id).collect()
    }

    pub fn error_stages(&self) -> Vec<DispatchStage> {
        self.errors.lock().unwrap().iter().map(|(stage, _)| *stage).collect()
    }
}

impl SnacTransport for TestTransport {
    fn send_frame(&self, frame: &SnacFrame) -> std::io::Result<()> {
        self.sent.lock().unwrap().push(frame.clone());
        Ok(())
    }

    fn report_error(&self, error: &DispatchError) {
        self.errors
            .lock()
            .unwrap()
            .push((error.stage, error.to_string()));
    }
}

/// Request listener recording responses and timeouts.
#[derive(Default)]
pub struct RecordingRequestListener {
    pub responses: Mutex<Vec<u32>>,
    pub timeouts: Mutex<Vec<(u32, TimeoutReason)>>,
}

impl RequestListener for RecordingRequestListener {
    fn on_response(&self, event: &RequestResponseEvent) -> Result<(), ListenerError> {
        self.responses.lock().unwrap().push(event.request_id);
        Ok(())
    }

    fn on_timeout(&self, event: &RequestTimeoutEvent) {
        self.timeouts
            .lock()
            .unwrap()
            .push((event.request_id, event.reason));
    }
}

/// A request carrying a raw command of the given type.
pub fn raw_request(command_type: CommandType) -> SnacRequest {
    SnacRequest::new(Arc::new(RawCommand::new(command_type, Bytes::new())))
}

/// An inbound frame of the given type echoing `request_id`.
pub fn inbound(command_type: CommandType, request_id: u32) -> SnacFrame {
    SnacFrame::new(command_type, request_id, Bytes::from_static(b"payload"))
}

/// Let spawned tasks (the rate scheduler) observe pending wake signals.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
