use std::num::NonZeroUsize;

/// Split pending filenames into request-sized chunks, preserving order.
/// The last chunk holds the remainder.
pub fn partition<T>(items: &[T], size: NonZeroUsize) -> std::slice::Chunks<'_, T> {
    items.chunks(size.get())
}

/// Number of chunks `partition` yields for `len` items.
pub fn chunk_count(len: usize, size: NonZeroUsize) -> usize {
    len.div_ceil(size.get())
}
