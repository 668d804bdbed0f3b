use bytes::Bytes;

use crate::constants::CHUNK_SIZE;
use crate::engine::quality::ScaledDims;

/// Digest of a raw frame at 32-sample granularity.
pub type FrameDigest = [u8; 16];

/// A finished JPEG frame.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub dims: ScaledDims,
}

/// An oversized frame split for delivery. Chunks are slices into the
/// original encoded buffer, so they share its allocation and lifetime.
#[derive(Debug, Clone)]
pub struct ChunkedFrame {
    pub chunks: Vec<Bytes>,
    pub total: usize,
    pub dims: ScaledDims,
}

/// What the engine hands each subscriber.
#[derive(Debug, Clone)]
pub enum FramePayload {
    Full(EncodedFrame),
    Chunked(ChunkedFrame),
}

impl FramePayload {
    pub fn dims(&self) -> ScaledDims {
        match self {
            FramePayload::Full(frame) => frame.dims,
            FramePayload::Chunked(frame) => frame.dims,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            FramePayload::Full(frame) => frame.data.len(),
            FramePayload::Chunked(frame) => frame.chunks.iter().map(Bytes::len).sum(),
        }
    }
}

/// Split an encoded frame into 32 KiB sub-buffers (the last may be shorter).
pub fn chunk_frame(frame: EncodedFrame) -> ChunkedFrame {
    let mut chunks = Vec::with_capacity((frame.data.len() + CHUNK_SIZE - 1) / CHUNK_SIZE);
    let mut offset = 0;
    while offset < frame.data.len() {
        let end = (offset + CHUNK_SIZE).min(frame.data.len());
        chunks.push(frame.data.slice(offset..end));
        offset = end;
    }
    ChunkedFrame {
        total: chunks.len(),
        chunks,
        dims: frame.dims,
    }
}

/// Cheap change-detection digest: hash 32 equally spaced bytes of the raw
/// sample. Collisions at this granularity are acceptable for a
/// skip-if-identical heuristic.
pub fn sampled_digest(data: &[u8]) -> FrameDigest {
    const SAMPLES: usize = 32;
    let mut sampled = [0u8; SAMPLES];
    if !data.is_empty() {
        let step = data.len() / SAMPLES;
        let offset = step / 2;
        for (i, slot) in sampled.iter_mut().enumerate() {
            *slot = data[(i * step + offset).min(data.len() - 1)];
        }
    }
    md5::compute(sampled).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> ScaledDims {
        ScaledDims {
            width: 1200,
            height: 675,
        }
    }

    #[test]
    fn test_chunking_splits_into_32k_pieces() {
        // 2 MiB encoded frame: exactly 64 full chunks.
        let data = Bytes::from(vec![7u8; 2_097_152]);
        let chunked = chunk_frame(EncodedFrame {
            data: data.clone(),
            dims: dims(),
        });
        assert_eq!(chunked.total, 64);
        assert_eq!(chunked.chunks.len(), 64);
        assert!(chunked.chunks.iter().all(|c| c.len() == CHUNK_SIZE));
    }

    #[test]
    fn test_chunks_concatenate_to_original() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let data = Bytes::from(payload.clone());
        let chunked = chunk_frame(EncodedFrame { data, dims: dims() });

        let mut rebuilt = Vec::new();
        for chunk in &chunked.chunks {
            rebuilt.extend_from_slice(chunk);
        }
        assert_eq!(rebuilt, payload);

        // 100_000 = 3 * 32768 + 1696
        assert_eq!(chunked.total, 4);
        assert_eq!(chunked.chunks[3].len(), 1696);
    }

    #[test]
    fn test_digest_is_deterministic() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
        assert_eq!(sampled_digest(&data), sampled_digest(&data));
    }

    #[test]
    fn test_digest_sees_sampled_changes() {
        let data = vec![0u8; 4096];
        let mut changed = data.clone();
        // step = 128, offset = 64: byte 64 is the first sampled position.
        changed[64] = 0xFF;
        assert_ne!(sampled_digest(&data), sampled_digest(&changed));
    }

    #[test]
    fn test_digest_blind_between_samples() {
        // A change that no sampled position covers goes unnoticed; that is
        // the accepted trade-off of the heuristic.
        let data = vec![0u8; 4096];
        let mut changed = data.clone();
        changed[0] = 0xFF;
        assert_eq!(sampled_digest(&data), sampled_digest(&changed));
    }

    #[test]
    fn test_digest_handles_tiny_buffers() {
        let a = sampled_digest(&[1, 2, 3]);
        let b = sampled_digest(&[1, 2, 3]);
        assert_eq!(a, b);
        assert_ne!(sampled_digest(&[9, 9, 9]), a);
    }
}
