//! Built-in host implementations of the pipeline kernels.
//!
//! Each kernel runs one work item per candidate slot. Buffers are viewed as
//! bytes in host word order, which is the layout the device kernels see on
//! little-endian hardware.

use chain_core::reference;

use crate::BackendError;

/// Host operation behind a kernel entry point.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum KernelOp {
    /// `(in words, in length, out words, out length)`, SHA-512.
    DigestA,
    /// `(in words, in length, out words, out length)`, MD5.
    DigestB,
    /// `(a words, a length, b words, b length, out words, out length)`.
    Combine,
}

impl KernelOp {
    /// Number of buffer arguments the kernel signature takes.
    pub fn arity(self) -> usize {
        match self {
            KernelOp::DigestA | KernelOp::DigestB => 4,
            KernelOp::Combine => 6,
        }
    }

    /// Entry-point symbol the device sources use for this operation.
    pub fn default_entry_point(self) -> &'static str {
        match self {
            KernelOp::DigestA => "simple_sha512",
            KernelOp::DigestB => "simple_md5",
            KernelOp::Combine => "simple_xor",
        }
    }

    fn output_len(self) -> usize {
        match self {
            KernelOp::DigestA | KernelOp::Combine => reference::DIGEST_A_LEN,
            KernelOp::DigestB => reference::DIGEST_B_LEN,
        }
    }
}

/// Per-work-item view over a value buffer and its length buffer.
struct SlotLayout {
    slot_words: usize,
    shared_length: bool,
}

impl SlotLayout {
    fn new(
        kernel: &str,
        values: &[u32],
        lengths: &[u32],
        work_items: usize,
    ) -> Result<Self, BackendError> {
        let slot_words = values.len() / work_items;
        if slot_words == 0 {
            return Err(device_error(
                kernel,
                format!(
                    "value buffer of {} words cannot hold {work_items} slots",
                    values.len()
                ),
            ));
        }
        let shared_length = lengths.len() == 1;
        if !shared_length && lengths.len() < work_items {
            return Err(device_error(
                kernel,
                format!(
                    "length buffer of {} words cannot hold {work_items} slots",
                    lengths.len()
                ),
            ));
        }
        Ok(Self {
            slot_words,
            shared_length,
        })
    }

    fn words(&self, gid: usize) -> std::ops::Range<usize> {
        gid * self.slot_words..(gid + 1) * self.slot_words
    }

    fn length_index(&self, gid: usize) -> usize {
        if self.shared_length {
            0
        } else {
            gid
        }
    }

    fn slot_bytes(&self) -> usize {
        self.slot_words * chain_core::WORD_SIZE
    }
}

fn device_error(kernel: &str, detail: String) -> BackendError {
    BackendError::Device {
        op: "enqueue_kernel",
        detail: format!("{kernel}: {detail}"),
    }
}

/// Declared input bytes of one slot.
fn input_slot<'a>(
    kernel: &str,
    layout: &SlotLayout,
    values: &'a [u32],
    lengths: &[u32],
    gid: usize,
) -> Result<&'a [u8], BackendError> {
    let declared = lengths[layout.length_index(gid)] as usize;
    let bytes: &[u8] = bytemuck::cast_slice(&values[layout.words(gid)]);
    bytes.get(..declared).ok_or_else(|| {
        device_error(
            kernel,
            format!(
                "slot {gid} declares {declared} bytes but holds {}",
                bytes.len()
            ),
        )
    })
}

fn write_slot(layout: &SlotLayout, out: &mut [u32], gid: usize, digest: &[u8]) {
    let slot = &mut out[layout.words(gid)];
    slot.fill(0);
    let bytes: &mut [u8] = bytemuck::cast_slice_mut(slot);
    bytes[..digest.len()].copy_from_slice(digest);
}

/// Run a digest kernel over `work_items` slots.
///
/// `op` must be `DigestA` or `DigestB`.
pub(crate) fn run_digest(
    op: KernelOp,
    kernel: &str,
    input: &[u32],
    input_len: &[u32],
    out: &mut [u32],
    out_len: &mut [u32],
    work_items: usize,
) -> Result<(), BackendError> {
    let in_layout = SlotLayout::new(kernel, input, input_len, work_items)?;
    let out_layout = SlotLayout::new(kernel, out, out_len, work_items)?;
    check_output_width(op, kernel, &out_layout)?;

    for gid in 0..work_items {
        let bytes = input_slot(kernel, &in_layout, input, input_len, gid)?;
        let digest = match op {
            KernelOp::DigestA => reference::digest_a(bytes).to_vec(),
            KernelOp::DigestB => reference::digest_b(bytes).to_vec(),
            KernelOp::Combine => {
                return Err(device_error(kernel, "combine is not a digest kernel".into()))
            }
        };
        write_slot(&out_layout, out, gid, &digest);
        out_len[out_layout.length_index(gid)] = digest.len() as u32;
    }
    Ok(())
}

/// Run the combine kernel over `work_items` slots.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_combine(
    kernel: &str,
    a: &[u32],
    a_len: &[u32],
    b: &[u32],
    b_len: &[u32],
    out: &mut [u32],
    out_len: &mut [u32],
    work_items: usize,
) -> Result<(), BackendError> {
    let a_layout = SlotLayout::new(kernel, a, a_len, work_items)?;
    let b_layout = SlotLayout::new(kernel, b, b_len, work_items)?;
    let out_layout = SlotLayout::new(kernel, out, out_len, work_items)?;
    check_output_width(KernelOp::Combine, kernel, &out_layout)?;

    for gid in 0..work_items {
        let a_bytes = input_slot(kernel, &a_layout, a, a_len, gid)?;
        let b_bytes = input_slot(kernel, &b_layout, b, b_len, gid)?;
        let combined = reference::combine(a_bytes, b_bytes);
        if combined.len() > out_layout.slot_bytes() {
            return Err(device_error(
                kernel,
                format!(
                    "slot {gid} output of {} bytes exceeds slot width {}",
                    combined.len(),
                    out_layout.slot_bytes()
                ),
            ));
        }
        write_slot(&out_layout, out, gid, &combined);
        out_len[out_layout.length_index(gid)] = combined.len() as u32;
    }
    Ok(())
}

fn check_output_width(op: KernelOp, kernel: &str, layout: &SlotLayout) -> Result<(), BackendError> {
    if layout.slot_bytes() < op.output_len() {
        return Err(device_error(
            kernel,
            format!(
                "output slot of {} bytes is narrower than the {}-byte result",
                layout.slot_bytes(),
                op.output_len()
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate_block(index: u64, words: usize) -> Vec<u32> {
        chain_core::index_to_words(index, words)
    }

    #[test]
    fn digest_kernel_matches_reference_per_slot() {
        let words = 16;
        let mut input = candidate_block(1000, words);
        input.extend(candidate_block(1001, words));
        let input_len = vec![4u32, 4];
        let mut out = vec![0xDEAD_BEEFu32; 2 * words];
        let mut out_len = vec![0u32; 2];

        run_digest(
            KernelOp::DigestB,
            "simple_md5",
            &input,
            &input_len,
            &mut out,
            &mut out_len,
            2,
        )
        .expect("digest");

        assert_eq!(out_len, vec![16, 16]);
        let bytes: &[u8] = bytemuck::cast_slice(&out);
        let expected = reference::digest_b(&reference::candidate_bytes(1001, 4));
        assert_eq!(&bytes[64..80], &expected);
        assert!(bytes[80..128].iter().all(|&b| b == 0), "slot tail not cleared");
    }

    #[test]
    fn shared_length_scalar_applies_to_every_slot() {
        let words = 16;
        let mut input = candidate_block(7, words);
        input.extend(candidate_block(8, words));
        let mut out = vec![0u32; 2 * words];
        let mut out_len = vec![0u32; 1];

        run_digest(
            KernelOp::DigestA,
            "simple_sha512",
            &input,
            &[4],
            &mut out,
            &mut out_len,
            2,
        )
        .expect("digest");

        assert_eq!(out_len, vec![64]);
        let bytes: &[u8] = bytemuck::cast_slice(&out);
        assert_eq!(
            &bytes[64..128],
            &reference::digest_a(&reference::candidate_bytes(8, 4))
        );
    }

    #[test]
    fn declared_length_past_slot_is_rejected() {
        let input = candidate_block(1, 1);
        let mut out = vec![0u32; 16];
        let mut out_len = vec![0u32; 1];
        let err = run_digest(
            KernelOp::DigestB,
            "simple_md5",
            &input,
            &[5],
            &mut out,
            &mut out_len,
            1,
        )
        .unwrap_err();
        assert!(matches!(err, BackendError::Device { .. }), "{err}");
    }

    #[test]
    fn narrow_output_slot_is_rejected() {
        let input = candidate_block(1, 4);
        let mut out = vec![0u32; 4];
        let mut out_len = vec![0u32; 1];
        let err = run_digest(
            KernelOp::DigestA,
            "simple_sha512",
            &input,
            &[4],
            &mut out,
            &mut out_len,
            1,
        )
        .unwrap_err();
        assert!(err.to_string().contains("narrower"), "{err}");
    }
}
