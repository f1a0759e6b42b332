//! Fan-in reception: wait on many message sources at once and run each
//! ready source's receive closure. The closure owns its channel; this type
//! only multiplexes readability.

use crate::mux::{IoResource, MuxError, MuxResult};
use std::io;
use std::sync::Arc;

/// Invoked when the paired resource is readable. Expected to perform one
/// receive pass on the channel it owns.
pub type ReceiveFunction = Box<dyn FnMut(&Arc<dyn IoResource>) + Send>;

struct Entry {
    resource: Arc<dyn IoResource>,
    receive: ReceiveFunction,
}

/// Readiness-driven dispatcher over any number of receive closures. Not
/// internally synchronized; one owner drives it.
pub struct MultiReceiver {
    entries: Vec<Entry>,
    fds: Vec<libc::pollfd>,
}

impl MultiReceiver {
    #[inline]
    pub fn new() -> MultiReceiver {
        MultiReceiver {
            entries: Vec::new(),
            fds: Vec::new(),
        }
    }

    /// Number of registered sources.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Registers a source with its receive closure.
    pub fn add(&mut self, resource: Arc<dyn IoResource>, receive: ReceiveFunction) -> MuxResult<()> {
        if self.position(&resource).is_some() {
            return Err(MuxError::AlreadyRegistered);
        }

        self.entries.push(Entry { resource, receive });
        Ok(())
    }

    /// Drops a source.
    pub fn remove(&mut self, resource: &Arc<dyn IoResource>) -> MuxResult<()> {
        let index = self.position(resource).ok_or(MuxError::NotFound)?;

        self.entries.remove(index);
        Ok(())
    }

    /// Waits for readability and runs every ready source's closure once.
    /// Returns `false` on timeout; `timeout_ms < 0` blocks indefinitely.
    pub fn receive(&mut self, timeout_ms: i32) -> MuxResult<bool> {
        self.fds.clear();

        for entry in &self.entries {
            self.fds.push(libc::pollfd {
                fd: entry.resource.read_handle(),
                events: libc::POLLIN,
                revents: 0,
            });
        }

        let ready = unsafe {
            libc::poll(self.fds.as_mut_ptr(), self.fds.len() as libc::nfds_t, timeout_ms)
        };

        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                return Ok(false);
            }
            return Err(MuxError::from(err));
        }

        if ready == 0 {
            return Ok(false);
        }

        for index in 0..self.entries.len() {
            if self.fds[index].revents == 0 {
                continue;
            }

            let entry = &mut self.entries[index];
            let resource = entry.resource.clone();
            (entry.receive)(&resource);
        }

        Ok(true)
    }

    fn position(&self, resource: &Arc<dyn IoResource>) -> Option<usize> {
        let key = Arc::as_ptr(resource) as *const () as usize;

        self.entries
            .iter()
            .position(|entry| Arc::as_ptr(&entry.resource) as *const () as usize == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::net::datagram::DatagramChannel;
    use crate::testkit::{self, Probe};
    use std::net::UdpSocket;
    use std::sync::Mutex;
    use std::time::Duration;

    fn connected_pair() -> (UdpSocket, UdpSocket) {
        let first = UdpSocket::bind("127.0.0.1:0").unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").unwrap();

        first.connect(second.local_addr().unwrap()).unwrap();
        second.connect(first.local_addr().unwrap()).unwrap();
        second
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        (first, second)
    }

    #[test]
    fn test_fan_in_over_two_channels() {
        testkit::init();

        let (sender_a, receiver_a) = connected_pair();
        let (sender_b, receiver_b) = connected_pair();

        // Sources are registered by the socket resource; each closure owns
        // its channel and pushes decoded codes into the shared sink.
        let resource_a: Arc<dyn IoResource> = Arc::new(receiver_a.try_clone().unwrap());
        let resource_b: Arc<dyn IoResource> = Arc::new(receiver_b.try_clone().unwrap());

        let sink = Arc::new(Mutex::new(Vec::new()));

        let mut multi = MultiReceiver::new();

        let mut channel_a = DatagramChannel::new(receiver_a, ChannelConfig::default(), None);
        {
            let sink = sink.clone();
            multi
                .add(
                    resource_a,
                    Box::new(move |_res| {
                        let msg = channel_a.receive_message().unwrap().unwrap();
                        sink.lock().unwrap().push(msg.downcast_ref::<Probe>().unwrap().code);
                    }),
                )
                .unwrap();
        }

        let mut channel_b = DatagramChannel::new(receiver_b, ChannelConfig::default(), None);
        {
            let sink = sink.clone();
            multi
                .add(
                    resource_b,
                    Box::new(move |_res| {
                        let msg = channel_b.receive_message().unwrap().unwrap();
                        sink.lock().unwrap().push(msg.downcast_ref::<Probe>().unwrap().code);
                    }),
                )
                .unwrap();
        }

        assert_eq!(multi.len(), 2);

        // Nothing pending yet.
        assert!(!multi.receive(0).unwrap());

        let mut tx_a = DatagramChannel::new(sender_a, ChannelConfig::default(), None);
        let mut tx_b = DatagramChannel::new(sender_b, ChannelConfig::default(), None);

        let probe = |code| Probe {
            code,
            level: 0,
            flag: false,
        };

        assert!(tx_a.send_message(&probe(1)).unwrap());
        assert!(tx_b.send_message(&probe(2)).unwrap());

        let mut rounds = 0;
        while sink.lock().unwrap().len() < 2 {
            assert!(rounds < 50, "messages did not arrive");
            multi.receive(1000).unwrap();
            rounds += 1;
        }

        let mut received = sink.lock().unwrap().clone();
        received.sort();
        assert_eq!(received, vec![1, 2]);
    }

    #[test]
    fn test_duplicate_source_rejected() {
        let pipe: Arc<dyn IoResource> = Arc::new(crate::pipe::Pipe::new().unwrap());

        let mut multi = MultiReceiver::new();
        multi.add(pipe.clone(), Box::new(|_res| {})).unwrap();

        assert_eq!(
            multi.add(pipe.clone(), Box::new(|_res| {})).unwrap_err(),
            MuxError::AlreadyRegistered
        );

        multi.remove(&pipe).unwrap();
        assert_eq!(multi.remove(&pipe).unwrap_err(), MuxError::NotFound);
    }
}
