//! Datagram source that replays a fixed script

use std::collections::VecDeque;
use std::io;

use crate::stop::StopSignal;
use crate::transport::{DatagramSource, RecvOutcome};

/// One scripted receive result
#[derive(Debug, Clone)]
pub enum ScriptEvent {
    /// Deliver this datagram
    Datagram(Vec<u8>),
    /// Report a poll timeout
    Timeout,
    /// Report that the source started over
    Rewind,
    /// Fail with this I/O error kind
    Fail(io::ErrorKind),
}

/// Source yielding scripted events, then either closing or stopping
#[derive(Debug, Default)]
pub struct ScriptedSource {
    events: VecDeque<ScriptEvent>,
    stop_when_drained: Option<StopSignal>,
    /// Number of receive calls made so far
    pub recv_calls: usize,
}

impl ScriptedSource {
    /// Source delivering `datagrams` in order, then closing
    pub fn from_datagrams<I>(datagrams: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::from_events(datagrams.into_iter().map(ScriptEvent::Datagram))
    }

    /// Source yielding `events` in order, then closing
    pub fn from_events<I>(events: I) -> Self
    where
        I: IntoIterator<Item = ScriptEvent>,
    {
        Self {
            events: events.into_iter().collect(),
            stop_when_drained: None,
            recv_calls: 0,
        }
    }

    /// Raise `stop` and time out once the script runs dry, like a quiet
    /// socket interrupted by Ctrl-C
    pub fn stop_when_drained(mut self, stop: StopSignal) -> Self {
        self.stop_when_drained = Some(stop);
        self
    }
}

impl DatagramSource for ScriptedSource {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<RecvOutcome> {
        self.recv_calls += 1;
        match self.events.pop_front() {
            Some(ScriptEvent::Datagram(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(RecvOutcome::Datagram(len))
            }
            Some(ScriptEvent::Timeout) => Ok(RecvOutcome::Timeout),
            Some(ScriptEvent::Rewind) => Ok(RecvOutcome::Rewound),
            Some(ScriptEvent::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            None => match &self.stop_when_drained {
                Some(stop) => {
                    stop.stop();
                    Ok(RecvOutcome::Timeout)
                }
                None => Ok(RecvOutcome::Closed),
            },
        }
    }
}
