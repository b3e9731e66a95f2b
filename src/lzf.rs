//! LZF byte-stream codec used by the PCD `binary_compressed` payload.
//!
//! The wire format is Marc Lehmann's LZF: a stream of control-tagged units.
//! A control byte below 32 starts a literal run of `ctrl + 1` raw bytes.
//! Any other control byte is a back-reference: the top three bits carry the
//! base copy length (a value of 7 pulls one extension byte), the low five
//! bits and the following byte form the backward offset minus one, and
//! `length + 2` bytes are copied from behind the current output position.

use crate::error::{Error, Result};

/// Longest literal run a single control byte can describe.
const MAX_LITERAL_RUN: usize = 32;

/// Decompresses `input` into `output`, returning the number of bytes produced.
///
/// Stops when either buffer is exhausted. Truncated streams, back-references
/// reaching behind the start of the output and units larger than the
/// remaining output space are all reported as errors; no partial garbage is
/// ever left behind a returned length, and no access outside the two slices
/// is attempted regardless of input.
pub fn decompress_into(input: &[u8], output: &mut [u8]) -> Result<usize> {
    let mut ip = 0;
    let mut op = 0;

    while ip < input.len() && op < output.len() {
        let ctrl = input[ip];
        ip += 1;

        if ctrl < 32 {
            // literal run of ctrl + 1 bytes
            let run_len = ctrl as usize + 1;
            if input.len() - ip < run_len {
                return Err(Error::TruncatedStream);
            }
            if output.len() - op < run_len {
                return Err(Error::InsufficientCapacity);
            }
            output[op..op + run_len].copy_from_slice(&input[ip..ip + run_len]);
            ip += run_len;
            op += run_len;
        } else {
            // back-reference
            let mut len = (ctrl >> 5) as usize;
            if ip >= input.len() {
                return Err(Error::TruncatedStream);
            }
            if len == 7 {
                len += input[ip] as usize;
                ip += 1;
                if ip >= input.len() {
                    return Err(Error::TruncatedStream);
                }
            }
            let offset = (((ctrl & 0x1f) as usize) << 8) + input[ip] as usize + 1;
            ip += 1;

            if offset > op {
                return Err(Error::InvalidBackReference {
                    offset,
                    produced: op,
                });
            }
            let copy_len = len + 2;
            if output.len() - op < copy_len {
                return Err(Error::InsufficientCapacity);
            }

            // source and destination may overlap, so copy forward byte by byte
            let mut reference = op - offset;
            for _ in 0..copy_len {
                output[op] = output[reference];
                op += 1;
                reference += 1;
            }
        }
    }
    Ok(op)
}

/// Decompresses `input` into a freshly allocated buffer of `expected_len`
/// bytes, failing unless exactly that many bytes are produced.
pub fn decompress(input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut output = vec![0u8; expected_len];
    let produced = decompress_into(input, &mut output)?;
    if produced != expected_len {
        return Err(Error::DecompressedSizeMismatch {
            expected: expected_len,
            actual: produced,
        });
    }
    Ok(output)
}

/// Compresses `input` as a sequence of literal runs.
///
/// The encoder never emits back-references, trading ratio for predictability;
/// the output always decodes losslessly with [decompress]. Empty input yields
/// an empty stream.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() + input.len() / MAX_LITERAL_RUN + 1);
    for run in input.chunks(MAX_LITERAL_RUN) {
        output.push((run.len() - 1) as u8);
        output.extend_from_slice(run);
    }
    output
}
