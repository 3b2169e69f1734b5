//! Splitting large buffers into bounded chunks and putting them back together

use std::collections::HashMap;

use crate::message::FullDataChunk;

/// Split `data` into chunks of at most `chunk_size` bytes.
///
/// Always yields at least one chunk so an empty buffer still announces its id.
pub fn split_into_chunks(buffer_id: u32, data: &[u8], chunk_size: usize) -> Vec<FullDataChunk> {
    let chunk_size = chunk_size.max(1);
    if data.is_empty() {
        return vec![FullDataChunk {
            buffer_id,
            is_first: true,
            payload: Vec::new(),
        }];
    }

    data.chunks(chunk_size)
        .enumerate()
        .map(|(i, slice)| FullDataChunk {
            buffer_id,
            is_first: i == 0,
            payload: slice.to_vec(),
        })
        .collect()
}

/// Receiver-side reassembly keyed by buffer id.
///
/// Buffer ids grow monotonically per session, so taking a buffer also drops
/// any older, superseded partial buffers.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffers: HashMap<u32, Vec<u8>>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Non-first chunks for an unknown buffer are ignored.
    pub fn accept(&mut self, chunk: FullDataChunk) {
        if chunk.is_first {
            self.buffers.insert(chunk.buffer_id, chunk.payload);
        } else if let Some(buffer) = self.buffers.get_mut(&chunk.buffer_id) {
            buffer.extend_from_slice(&chunk.payload);
        } else {
            log::debug!("Dropping chunk for unknown buffer {}", chunk.buffer_id);
        }
    }

    /// Remove a completed buffer, discarding stale ones below it
    pub fn take(&mut self, buffer_id: u32) -> Option<Vec<u8>> {
        let buffer = self.buffers.remove(&buffer_id);
        self.buffers.retain(|&id, _| id > buffer_id);
        buffer
    }

    /// Number of partially received buffers
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}
