//! `StreamFanout`: one block queue and decode worker per `(topic, threadId)`,
//! fanning fetched blocks out into user-visible batches of decoded messages.
//!
//! The block queue is the only backpressure mechanism between the fetch
//! path and user delivery: it is bounded, and a full queue simply blocks the
//! `FetchManager`'s push until the user drains its stream.

use std::cell::Cell;
use std::rc::Rc;

use bytes::Bytes;
use futures::future::{self, Either};
use futures::sync::mpsc;
use futures::{Poll, Sink, Stream as FutureStream};
use tokio_core::reactor::Handle;

use errors::{Error, ErrorKind, Result};
use types::ThreadId;

/// An opaque, still-encoded block fetched from a broker for one partition.
/// Decoding it is the responsibility of a `BlockDecoder`, supplied by the
/// embedding process — this crate only moves blocks from queue to decoder
/// to output channel.
#[derive(Clone, Debug)]
pub struct Block {
    pub topic: String,
    pub partition: i32,
    pub data: Bytes,
}

/// A single decoded record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
}

/// Decodes one fetched `Block` into zero or more `Message`s. Supplied by the
/// embedding process; this crate never interprets the block's bytes itself.
pub trait BlockDecoder {
    fn decode(&self, block: &Block) -> Result<Vec<Message>>;
}

pub type BlockSender = mpsc::Sender<Block>;
type BlockReceiver = mpsc::Receiver<Block>;
type MessageSender = mpsc::Sender<Vec<Message>>;
type MessageReceiver = mpsc::Receiver<Vec<Message>>;

/// The user-visible half of a `Stream`: yields batches of decoded messages.
/// The output channel is never closed automatically on shutdown — callers
/// observe shutdown through `Coordinator::close`, matching the contract that
/// not every embedding language can close a multi-producer channel safely.
pub struct ConsumerStream {
    rx: MessageReceiver,
}

impl FutureStream for ConsumerStream {
    type Item = Vec<Message>;
    type Error = Error;

    fn poll(&mut self) -> Poll<Option<Self::Item>, Self::Error> {
        self.rx
            .poll()
            .map_err(|_| ErrorKind::CoordUnavailable("stream worker exited".to_owned()).into())
    }
}

/// The Coordinator/Registry-facing half of a `Stream`: where fetched blocks
/// go in, and how the worker is told to stop.
#[derive(Clone)]
pub struct StreamHandle {
    topic: String,
    thread_id: ThreadId,
    block_tx: BlockSender,
    closed: Rc<Cell<bool>>,
}

impl StreamHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// A clone of the bounded sender `PartitionTopicInfo::block_queue` holds;
    /// several partitions of the same topic owned by the same thread clone
    /// this same handle's sender, so they share one queue and one worker.
    pub fn block_queue(&self) -> BlockSender {
        self.block_tx.clone()
    }

    /// Signal the worker to stop after its current block. Does not close the
    /// output channel; see the struct-level doc on `ConsumerStream`.
    pub fn close(&self) {
        self.closed.set(true);
    }
}

/// Creates one `Stream` (a `ConsumerStream` handed to the user, and a
/// `StreamHandle` kept by the Coordinator) and spawns its decode worker onto
/// the reactor.
pub struct StreamFanout;

impl StreamFanout {
    pub fn create<D>(
        handle: &Handle,
        topic: String,
        thread_id: ThreadId,
        queued_max_messages: usize,
        decoder: Rc<D>,
    ) -> (ConsumerStream, StreamHandle)
    where
        D: BlockDecoder + 'static,
    {
        let (block_tx, block_rx) = mpsc::channel(queued_max_messages);
        let (output_tx, output_rx) = mpsc::channel(queued_max_messages);
        let closed = Rc::new(Cell::new(false));

        handle.spawn(worker(block_rx, output_tx, closed.clone(), decoder, topic.clone(), thread_id.clone()));

        let stream = ConsumerStream { rx: output_rx };
        let handle = StreamHandle {
            topic: topic,
            thread_id: thread_id,
            block_tx: block_tx,
            closed: closed,
        };

        (stream, handle)
    }
}

fn worker<D>(
    block_rx: BlockReceiver,
    output_tx: MessageSender,
    closed: Rc<Cell<bool>>,
    decoder: Rc<D>,
    topic: String,
    thread_id: ThreadId,
) -> Box<::futures::Future<Item = (), Error = ()>>
where
    D: BlockDecoder + 'static,
{
    let topic_for_log = topic.clone();

    let work = block_rx
        .take_while(move |_| future::ok(!closed.get()))
        .for_each(move |block| {
            match decoder.decode(&block) {
                Ok(messages) => {
                    if messages.is_empty() {
                        Either::A(future::ok(()))
                    } else {
                        Either::B(output_tx.clone().send(messages).map(|_| ()).map_err(|_| ()))
                    }
                }
                Err(err) => {
                    warn!(
                        "dropping undecodable block for {}-{} (thread {}): {}",
                        block.topic, block.partition, thread_id, err
                    );
                    Either::A(future::ok(()))
                }
            }
        })
        .map(move |_| {
            trace!("stream worker for topic `{}` exited", topic_for_log);
        });

    Box::new(work)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A decoder that never yields a message; used by tests elsewhere in the
    /// crate that need a `BlockDecoder` but never push a `Block`.
    pub struct NullDecoder;

    impl BlockDecoder for NullDecoder {
        fn decode(&self, _block: &Block) -> Result<Vec<Message>> {
            Ok(Vec::new())
        }
    }

    struct EchoDecoder;

    impl BlockDecoder for EchoDecoder {
        fn decode(&self, block: &Block) -> Result<Vec<Message>> {
            if block.data.is_empty() {
                return Ok(Vec::new());
            }

            Ok(vec![
                Message {
                    topic: block.topic.clone(),
                    partition: block.partition,
                    offset: 0,
                    key: None,
                    value: block.data.clone(),
                },
            ])
        }
    }

    struct FailDecoder;

    impl BlockDecoder for FailDecoder {
        fn decode(&self, _block: &Block) -> Result<Vec<Message>> {
            Err(ErrorKind::Decode("boom".to_owned()).into())
        }
    }

    #[test]
    fn decoded_batches_reach_the_user_stream() {
        let mut core = ::tokio_core::reactor::Core::new().unwrap();
        let (stream, handle) = StreamFanout::create(
            &core.handle(),
            "t".to_owned(),
            ThreadId::new("c0", 0),
            8,
            Rc::new(EchoDecoder),
        );

        let mut block_tx = handle.block_queue();
        block_tx
            .try_send(Block {
                topic: "t".to_owned(),
                partition: 0,
                data: Bytes::from_static(b"hello"),
            })
            .unwrap();

        let (batch, _stream) = core.run(stream.into_future().map_err(|(e, _)| e)).unwrap();
        let batch = batch.expect("a batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, Bytes::from_static(b"hello"));
    }

    #[test]
    fn decode_failures_are_skipped_without_stalling_the_stream() {
        let mut core = ::tokio_core::reactor::Core::new().unwrap();
        let (_stream, handle) = StreamFanout::create(
            &core.handle(),
            "t".to_owned(),
            ThreadId::new("c0", 0),
            8,
            Rc::new(FailDecoder),
        );

        let mut block_tx = handle.block_queue();
        block_tx
            .try_send(Block {
                topic: "t".to_owned(),
                partition: 0,
                data: Bytes::from_static(b"bad"),
            })
            .unwrap();

        handle.close();
        core.turn(Some(::std::time::Duration::from_millis(50)));
    }
}
