use std::time::Duration;

use crate::message::Endpoint;

/// One datagram received in answer to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub data: Vec<u8>,
    pub peer_ip: String,
    pub peer_port: u16,
    /// Wall clock from send to receive.
    pub elapsed: Duration,
}

impl Reply {
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    pub fn elapsed_ms(&self) -> i64 {
        i64::try_from(self.elapsed.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Send one payload and wait for at most one reply.
///
/// `None` covers both "nothing arrived before `timeout`" and "could not send".
/// Retries are the caller's business.
pub trait Transport {
    fn send_and_await_reply(
        &mut self,
        endpoint: &Endpoint,
        payload: &[u8],
        timeout: Duration,
    ) -> Option<Reply>;

    /// Waits up to `timeout` for one more datagram without sending. Called
    /// after a reply turned out to answer some other request.
    fn await_reply(&mut self, timeout: Duration) -> Option<Reply> {
        let _ = timeout;
        None
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_and_await_reply(
        &mut self,
        endpoint: &Endpoint,
        payload: &[u8],
        timeout: Duration,
    ) -> Option<Reply> {
        (**self).send_and_await_reply(endpoint, payload, timeout)
    }

    fn await_reply(&mut self, timeout: Duration) -> Option<Reply> {
        (**self).await_reply(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send_and_await_reply(
        &mut self,
        endpoint: &Endpoint,
        payload: &[u8],
        timeout: Duration,
    ) -> Option<Reply> {
        (**self).send_and_await_reply(endpoint, payload, timeout)
    }

    fn await_reply(&mut self, timeout: Duration) -> Option<Reply> {
        (**self).await_reply(timeout)
    }
}
