use std::sync::Mutex;
use crate::handler::SessionEventHandler;

/// A [SessionEventHandler] that records every callback for later inspection
#[derive(Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<(u32, Vec<u8>)>>,
    idle_kicks: Mutex<Vec<u32>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHandler {
    pub fn new() -> RecordingHandler {
        Default::default()
    }

    pub fn messages(&self) -> Vec<(u32, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn idle_kicks(&self) -> Vec<u32> {
        self.idle_kicks.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl SessionEventHandler for RecordingHandler {
    fn on_message(&self, conv: u32, message: &[u8]) {
        self.messages.lock().unwrap()
            .push((conv, message.to_vec()));
    }

    fn on_idle_kick(&self, conv: u32) {
        self.idle_kicks.lock().unwrap()
            .push(conv);
    }

    fn on_error(&self, report: &str) {
        self.errors.lock().unwrap()
            .push(report.to_string());
    }
}
