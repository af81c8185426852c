//! Lifecycle and stream-boundary tests for the bzip2 codec.
//!
//! Descriptor-backed tests write through a `Bzip2Compressor` opened on a
//! temporary file, rewind the original descriptor, and read it back through a
//! `Bzip2Decompressor`. The duplicate descriptors share the file offset with
//! the original, so several compressors opened one after another append
//! concatenated bzip2 streams to the same file.
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use zio_codecs::bzip2_codec::{
    BUFFER_OUTPUT_SIZE, BZ_DATA_ERROR_MAGIC, BZ_IO_ERROR, BZ_UNEXPECTED_EOF,
};
use zio_codecs::{Bzip2BufferDecompressor, Bzip2Compressor, Bzip2Decompressor};
use zio_core::{CodecError, Compressor, Decompressor, Error, Fsync, INPUT_BUFFER_SIZE};

/// Generate `len` deterministic bytes using a simple LCG.
fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

// ── helpers ───────────────────────────────────────────────────────────────

/// Append one bzip2 stream holding `data` at the current offset of `file`.
fn compress_into(file: &File, data: &[u8]) {
    let mut c = Bzip2Compressor::new(file.as_raw_fd(), Fsync::No).unwrap();
    for chunk in data.chunks(7919) {
        c.write(chunk).unwrap();
    }
    c.close().unwrap();
}

/// Read and write ends of a fresh pipe.
fn pipe() -> (File, File) {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }
}

fn rewind(file: &mut File) {
    file.seek(SeekFrom::Start(0)).unwrap();
}

/// In-memory bzip2 stream, produced independently of the code under test.
fn bzip2_bytes(data: &[u8]) -> Vec<u8> {
    let mut enc = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(6));
    enc.write_all(data).unwrap();
    enc.finish().unwrap()
}

/// Read chunks until the first empty one.
fn read_all(d: &mut dyn Decompressor) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let chunk = d.read().unwrap();
        if chunk.is_empty() {
            return out;
        }
        out.extend_from_slice(&chunk);
    }
}

fn decompress_file(file: &mut File) -> Vec<u8> {
    rewind(file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    let out = read_all(&mut d);
    d.close().unwrap();
    out
}

fn codec_error(err: Error) -> CodecError {
    match err {
        Error::Codec(e) => e,
        other => panic!("expected a codec error, got {other:?}"),
    }
}

/// Collect chunks until the decompressor fails; panics if it finishes cleanly.
fn read_until_error(d: &mut dyn Decompressor) -> CodecError {
    loop {
        match d.read() {
            Ok(chunk) if chunk.is_empty() => panic!("decompressor finished without an error"),
            Ok(_) => {}
            Err(e) => return codec_error(e),
        }
    }
}

// ── compressor + stream decompressor ──────────────────────────────────────

#[test]
fn test_hello_world_round_trip() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"hello world");

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    assert_eq!(d.read().unwrap(), b"hello world");
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_round_trip_empty_input() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"");
    assert!(file.metadata().unwrap().len() > 0, "an empty stream still has a header");
    assert!(decompress_file(&mut file).is_empty());
}

#[test]
fn test_round_trip_embedded_zero_bytes() {
    let mut data = vec![0u8; 50_000];
    data.extend_from_slice(b"\0middle\0");
    data.extend(vec![0u8; 50_000]);

    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, &data);
    assert_eq!(decompress_file(&mut file), data);
}

#[test]
fn test_round_trip_spans_many_read_chunks() {
    let data = pseudo_random_bytes(5 * INPUT_BUFFER_SIZE + 123, 0xDEAD_BEEF);
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, &data);

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    let mut chunks = 0;
    let mut out = Vec::new();
    loop {
        let chunk = d.read().unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= INPUT_BUFFER_SIZE);
        chunks += 1;
        out.extend_from_slice(&chunk);
    }
    assert!(chunks > 5, "expected several chunks, got {chunks}");
    assert_eq!(out, data);
}

#[test]
fn test_fsync_policy_round_trip() {
    let data = compressible_bytes(100_000);
    let mut file = tempfile::tempfile().unwrap();
    let mut c = Bzip2Compressor::new(file.as_raw_fd(), Fsync::Yes).unwrap();
    c.write(&data).unwrap();
    c.close().unwrap();
    assert_eq!(decompress_file(&mut file), data);
}

/// fsync fails on a pipe; the descriptor is still closed and the finished
/// stream is complete on the other end.
#[test]
fn test_failed_fsync_still_closes_descriptor() {
    let (mut read_end, write_end) = pipe();
    let mut c = Bzip2Compressor::new(write_end.as_raw_fd(), Fsync::Yes).unwrap();
    c.write(b"synced or not").unwrap();

    match c.close().unwrap_err() {
        Error::Close { context, source, pending } => {
            assert_eq!(context, "fsync failed");
            assert_eq!(source.raw_os_error(), Some(libc::EINVAL));
            assert!(pending.is_none());
        }
        other => panic!("expected a close error, got {other:?}"),
    }
    c.close().unwrap();

    drop(write_end);
    let mut compressed = Vec::new();
    read_end.read_to_end(&mut compressed).unwrap();
    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    assert_eq!(read_all(&mut d), b"synced or not");
}

#[test]
fn test_concatenated_streams_are_read_as_one() {
    let a = compressible_bytes(3 * INPUT_BUFFER_SIZE + 17);
    let b = pseudo_random_bytes(40_000, 42);

    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, &a);
    compress_into(&file, &b);

    let mut expected = a.clone();
    expected.extend_from_slice(&b);
    assert_eq!(decompress_file(&mut file), expected);
}

/// Both members are small enough to sit in the staging buffer at once, so the
/// descriptor is already at EOF when the first stream ends.
#[test]
fn test_small_concatenated_streams_are_not_dropped() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"first member, ");
    compress_into(&file, b"second member, ");
    compress_into(&file, b"third member");

    assert_eq!(decompress_file(&mut file), b"first member, second member, third member");
}

/// A finished member is handed out while the writer still holds the pipe
/// open; the next member is only waited for on the following read.
#[test]
fn test_pipe_member_returned_before_writer_closes() {
    let (read_end, mut write_end) = pipe();
    write_end.write_all(&bzip2_bytes(b"first member")).unwrap();

    let mut d = Bzip2Decompressor::new(read_end.as_raw_fd()).unwrap();
    let (tx, rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        tx.send(d.read().unwrap()).unwrap();
        d
    });
    let chunk = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("decoded member held back waiting for more input");
    assert_eq!(chunk, b"first member");
    let mut d = reader.join().unwrap();

    write_end.write_all(&bzip2_bytes(b", second member")).unwrap();
    drop(write_end);
    assert_eq!(read_all(&mut d), b", second member");
    assert!(d.read().unwrap().is_empty());
    d.close().unwrap();
}

#[test]
fn test_empty_member_between_streams() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"before");
    compress_into(&file, b"");
    compress_into(&file, b"after");

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    let mut chunks = Vec::new();
    loop {
        let chunk = d.read().unwrap();
        if chunk.is_empty() {
            break;
        }
        chunks.push(chunk);
    }
    assert_eq!(chunks.concat(), b"beforeafter");
}

#[test]
fn test_end_of_input_is_sticky() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"sticky");

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    assert_eq!(d.read().unwrap(), b"sticky");
    for _ in 0..5 {
        assert!(d.read().unwrap().is_empty());
    }

    // More data appearing on the descriptor after the end does not revive it.
    file.seek(SeekFrom::End(0)).unwrap();
    compress_into(&file, b"late");
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_close_is_idempotent() {
    let mut file = tempfile::tempfile().unwrap();
    let mut c = Bzip2Compressor::new(file.as_raw_fd(), Fsync::No).unwrap();
    c.write(b"twice").unwrap();
    c.close().unwrap();
    c.close().unwrap();
    let size = file.metadata().unwrap().len();
    c.close().unwrap();
    assert_eq!(file.metadata().unwrap().len(), size);

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    assert_eq!(d.read().unwrap(), b"twice");
    d.close().unwrap();
    d.close().unwrap();
    assert!(d.read().unwrap().is_empty());

    let compressed = bzip2_bytes(b"twice");
    let mut b = Bzip2BufferDecompressor::new(&compressed).unwrap();
    b.close().unwrap();
    b.close().unwrap();
    assert!(b.read().unwrap().is_empty());
}

#[test]
fn test_write_after_close_fails() {
    let file = tempfile::tempfile().unwrap();
    let mut c = Bzip2Compressor::new(file.as_raw_fd(), Fsync::No).unwrap();
    c.close().unwrap();
    assert!(matches!(c.write(b"too late"), Err(Error::Closed(_))));
}

#[test]
fn test_drop_closes_the_stream() {
    let mut file = tempfile::tempfile().unwrap();
    {
        let mut c = Bzip2Compressor::new(file.as_raw_fd(), Fsync::No).unwrap();
        c.write(b"finished by drop").unwrap();
    }
    assert_eq!(decompress_file(&mut file), b"finished by drop");
}

#[test]
fn test_descriptor_stays_usable_after_close() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"payload");
    let compressed_len = file.metadata().unwrap().len();

    // Still writable after the compressor released its duplicate.
    file.write_all(b"tail").unwrap();
    assert_eq!(file.metadata().unwrap().len(), compressed_len + 4);
    file.set_len(compressed_len).unwrap();

    assert_eq!(decompress_file(&mut file), b"payload");

    // Still readable after the decompressor released its duplicate.
    rewind(&mut file);
    let mut raw = Vec::new();
    file.read_to_end(&mut raw).unwrap();
    assert_eq!(raw.len() as u64, compressed_len);
    assert_eq!(&raw[..3], b"BZh");
}

#[test]
fn test_invalid_descriptor_fails_open() {
    let err = codec_error(Bzip2Compressor::new(-1, Fsync::No).err().unwrap());
    assert_eq!(err.phase, "write open failed");
    assert_eq!(err.status, BZ_IO_ERROR);
    assert_eq!(err.errno, Some(libc::EBADF));

    let err = codec_error(Bzip2Decompressor::new(-1).err().unwrap());
    assert_eq!(err.phase, "read open failed");
    assert_eq!(err.errno, Some(libc::EBADF));
}

#[test]
fn test_garbage_input_fails_read() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"definitely not a bzip2 stream").unwrap();

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    let err = codec_error(d.read().unwrap_err());
    assert_eq!(err.phase, "read failed");
    assert_eq!(err.status, BZ_DATA_ERROR_MAGIC);
    assert_eq!(err.errno, None);
}

#[test]
fn test_trailing_garbage_after_stream_fails_after_data() {
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, b"good data");
    file.write_all(b"junk").unwrap();

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    assert_eq!(d.read().unwrap(), b"good data");
    let err = codec_error(d.read().unwrap_err());
    assert_eq!(err.status, BZ_DATA_ERROR_MAGIC);
}

#[test]
fn test_truncated_stream_reports_unexpected_eof() {
    let data = pseudo_random_bytes(100_000, 7);
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, &data);
    let len = file.metadata().unwrap().len();
    file.set_len(len / 2).unwrap();

    rewind(&mut file);
    let mut d = Bzip2Decompressor::new(file.as_raw_fd()).unwrap();
    let err = read_until_error(&mut d);
    assert_eq!(err.phase, "read failed");
    assert_eq!(err.status, BZ_UNEXPECTED_EOF);
}

// ── buffer decompressor ───────────────────────────────────────────────────

#[test]
fn test_buffer_zero_length() {
    let mut d = Bzip2BufferDecompressor::new(&[]).unwrap();
    assert!(d.read().unwrap().is_empty());
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_buffer_hello_world() {
    let compressed = bzip2_bytes(b"hello world");
    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    assert_eq!(d.read().unwrap(), b"hello world");
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_buffer_output_is_windowed() {
    let data = compressible_bytes(10 * BUFFER_OUTPUT_SIZE + 5);
    let compressed = bzip2_bytes(&data);

    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    let mut out = Vec::new();
    loop {
        let chunk = d.read().unwrap();
        if chunk.is_empty() {
            break;
        }
        assert!(chunk.len() <= BUFFER_OUTPUT_SIZE);
        out.extend_from_slice(&chunk);
    }
    assert_eq!(out, data);
}

#[test]
fn test_buffer_reads_after_completion_are_empty() {
    let compressed = bzip2_bytes(b"done");
    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    assert_eq!(read_all(&mut d), b"done");
    for _ in 0..10 {
        assert!(d.read().unwrap().is_empty());
    }
}

#[test]
fn test_buffer_reads_compressor_output() {
    let data = pseudo_random_bytes(30_000, 99);
    let mut file = tempfile::tempfile().unwrap();
    compress_into(&file, &data);

    rewind(&mut file);
    let mut compressed = Vec::new();
    file.read_to_end(&mut compressed).unwrap();

    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    assert_eq!(read_all(&mut d), data);
}

#[test]
fn test_buffer_garbage_fails_then_goes_inert() {
    let mut d = Bzip2BufferDecompressor::new(b"not bzip2 at all").unwrap();
    let err = codec_error(d.read().unwrap_err());
    assert_eq!(err.phase, "decompress failed");
    assert_eq!(err.status, BZ_DATA_ERROR_MAGIC);
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_buffer_truncated_reports_unexpected_eof() {
    let compressed = bzip2_bytes(&pseudo_random_bytes(50_000, 3));
    let truncated = &compressed[..compressed.len() / 2];

    let mut d = Bzip2BufferDecompressor::new(truncated).unwrap();
    let err = read_until_error(&mut d);
    assert_eq!(err.status, BZ_UNEXPECTED_EOF);
    assert!(d.read().unwrap().is_empty());
}

#[test]
fn test_buffer_decodes_only_first_stream() {
    let mut compressed = bzip2_bytes(b"first");
    compressed.extend(bzip2_bytes(b"second"));

    let mut d = Bzip2BufferDecompressor::new(&compressed).unwrap();
    assert_eq!(read_all(&mut d), b"first");
}
