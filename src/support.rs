//! Small future-related helpers shared across modules.

use futures::future::{self, Future};
use futures::IntoFuture;

use errors::{Error, ErrorKind};

/// A boxed, `'static` future, the same shape `tokio-kafka` uses throughout
/// its client for every async trait method: callers get a concrete,
/// object-safe return type without naming the combinator chain.
pub struct BoxFuture<T = (), E = Error>(Box<Future<Item = T, Error = E> + 'static>)
where
    T: 'static,
    E: 'static;

impl<T, E> BoxFuture<T, E> {
    pub fn new<F>(inner: F) -> Self
    where
        F: IntoFuture<Item = T, Error = E> + 'static,
        T: 'static,
        E: 'static,
    {
        BoxFuture(Box::new(inner.into_future()))
    }

    pub fn ok(item: T) -> Self {
        BoxFuture(Box::new(future::ok(item)))
    }

    pub fn err(err: E) -> Self {
        BoxFuture(Box::new(future::err(err)))
    }
}

impl<T, E> From<ErrorKind> for BoxFuture<T, E>
where
    E: From<ErrorKind>,
{
    fn from(err: ErrorKind) -> Self {
        Self::err(err.into())
    }
}

impl<T, E> Future for BoxFuture<T, E> {
    type Item = T;
    type Error = E;

    fn poll(&mut self) -> ::futures::Poll<Self::Item, Self::Error> {
        self.0.poll()
    }
}
