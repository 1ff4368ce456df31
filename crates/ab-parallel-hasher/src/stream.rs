//! The input side of the hasher: an asynchronous, single-consumer byte source.

use bytes::Bytes;
use futures::Stream;

use crate::error::StreamError;

/// An ordered, finite sequence of byte chunks followed by EOF, with a length known in advance.
///
/// `total_size` is supplied alongside the stream by the caller of
/// [`crate::ParallelHasher::hash_file`] rather than being part of this trait, since nothing about
/// the stream itself guarantees its own length; the dispatcher checks the two against each other
/// as bytes arrive (see [`StreamError::UnexpectedEof`] and [`StreamError::TooManyBytes`]).
pub trait ByteStream: Stream<Item = Result<Bytes, StreamError>> + Unpin {}

impl<T> ByteStream for T where T: Stream<Item = Result<Bytes, StreamError>> + Unpin {}
