use std::fmt;

use chain_core::WORD_SIZE;
use engine_host::ComputeBackend;

use crate::config::LengthLayout;
use crate::release::ReleaseStack;
use crate::SearchError;

/// Owner of a value/length buffer pair.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PairRole {
    Candidate,
    DigestA,
    DigestB,
    Combined,
}

impl PairRole {
    /// Allocation order.
    pub const ALL: [PairRole; 4] = [
        PairRole::Candidate,
        PairRole::DigestA,
        PairRole::DigestB,
        PairRole::Combined,
    ];

    fn index(self) -> usize {
        match self {
            PairRole::Candidate => 0,
            PairRole::DigestA => 1,
            PairRole::DigestB => 2,
            PairRole::Combined => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PairRole::Candidate => "candidate",
            PairRole::DigestA => "stageA",
            PairRole::DigestB => "stageB",
            PairRole::Combined => "combined",
        }
    }
}

/// One of the eight named device buffers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BufferRole {
    Value(PairRole),
    Length(PairRole),
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferRole::Value(p) => write!(f, "{}-value", p.name()),
            BufferRole::Length(p) => write!(f, "{}-length", p.name()),
        }
    }
}

/// Value buffer and its length buffer.
pub struct BufferPair<Buf> {
    // Declared length-first: the value buffer is created first and dropped last.
    length: Buf,
    value: Buf,
}

impl<Buf> BufferPair<Buf> {
    pub fn value(&self) -> &Buf {
        &self.value
    }

    pub fn length(&self) -> &Buf {
        &self.length
    }
}

/// The fixed table of device buffers, sized for one batch.
///
/// Every value buffer holds `batch_size * block_words` words; every length
/// buffer holds one word per slot or one shared word, per [`LengthLayout`].
/// Buffers are never aliased across roles.
pub struct BufferSet<B: ComputeBackend> {
    pairs: ReleaseStack<BufferPair<B::Buffer>>,
    batch_size: usize,
    block_words: usize,
    layout: LengthLayout,
}

impl<B: ComputeBackend> BufferSet<B> {
    pub fn allocate(
        backend: &B,
        batch_size: usize,
        block_words: usize,
        layout: LengthLayout,
    ) -> Result<Self, SearchError> {
        let value_words = batch_size.checked_mul(block_words).ok_or_else(|| {
            SearchError::Config(format!(
                "batch of {batch_size} x {block_words} words overflows"
            ))
        })?;
        let length_words = layout.words(batch_size);

        let mut pairs = ReleaseStack::with_capacity(PairRole::ALL.len());
        for role in PairRole::ALL {
            let value_label = BufferRole::Value(role).to_string();
            let value = backend.create_buffer(&value_label, value_words)?;
            let length_label = BufferRole::Length(role).to_string();
            let length = backend.create_buffer(&length_label, length_words)?;
            pairs.push(BufferPair { length, value });
        }
        log::debug!(
            target: "search",
            "allocated {} buffer pairs: {} value bytes, {} length words each",
            pairs.len(),
            value_words * WORD_SIZE,
            length_words
        );

        Ok(Self {
            pairs,
            batch_size,
            block_words,
            layout,
        })
    }

    pub fn pair(&self, role: PairRole) -> &BufferPair<B::Buffer> {
        &self.pairs[role.index()]
    }

    pub fn get(&self, role: BufferRole) -> &B::Buffer {
        match role {
            BufferRole::Value(p) => self.pair(p).value(),
            BufferRole::Length(p) => self.pair(p).length(),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn block_words(&self) -> usize {
        self.block_words
    }

    pub fn layout(&self) -> LengthLayout {
        self.layout
    }

    pub fn value_words(&self) -> usize {
        self.batch_size * self.block_words
    }

    /// Byte capacity of each value buffer.
    pub fn value_bytes(&self) -> usize {
        self.value_words() * WORD_SIZE
    }

    pub fn length_words(&self) -> usize {
        self.layout.words(self.batch_size)
    }
}
