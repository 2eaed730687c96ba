pub mod fixtures;

use aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use fixtures::*;
use std::io::{Read, Seek, SeekFrom};
use tempfile::TempDir;
use wmp_vault::prelude::*;
use wmp_vault::{NONCE_LEN, OVERHEAD, TAG_LEN};

#[test]
fn roundtrip_empty_sub_block_and_multi_block() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/roundtrip.mp4");

    for len in [0usize, 1, 15, 16, 17, 4096, 100_003] {
        let plaintext = sample(len);
        let path = seal(temp.path(), &format!("{len}.wmv"), &plaintext, &key);

        assert_eq!(std::fs::metadata(&path).unwrap().len(), len as u64 + OVERHEAD);
        assert_eq!(read_range(&path, &key, 0, None).unwrap(), plaintext, "len {len}");
    }
}

#[test]
fn encode_reports_total_bytes_written() {
    let key = key_for("/media/size.mp4");
    let mut out = Vec::new();
    let written = VaultEncoder::new().encode(&sample(1000)[..], &mut out, &key).unwrap();
    assert_eq!(written, 1028);
    assert_eq!(out.len(), 1028);
}

#[test]
fn megabyte_file_ranged_read() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/movie.mkv");
    let plaintext = sample(1_048_576);
    let path = seal(temp.path(), "movie.wmv", &plaintext, &key);

    let mut source = VaultSource::new(&path, &key);
    assert_eq!(source.open(600_000, Some(1024)).unwrap(), 1024);
    let bytes = drain(&mut source).unwrap();
    assert_eq!(bytes, &plaintext[600_000..601_024]);
}

#[test]
fn seek_on_and_off_block_boundaries() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/seek.mp4");
    let plaintext = sample(10_000);
    let path = seal(temp.path(), "seek.wmv", &plaintext, &key);

    for position in [0u64, 1, 15, 16, 17, 31, 32, 4095, 4096, 4097, 9_984, 9_999, 10_000] {
        let bytes = read_range(&path, &key, position, Some(333)).unwrap();
        let start = position as usize;
        let end = (start + 333).min(plaintext.len());
        assert_eq!(bytes, &plaintext[start..end], "position {position}");
    }
}

#[test]
fn declared_length_is_clipped_to_the_plaintext() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/clip.mp4");
    let path = seal(temp.path(), "clip.wmv", &sample(1000), &key);

    let mut source = VaultSource::new(&path, &key);
    assert_eq!(source.open(990, Some(100)).unwrap(), 10);
    assert_eq!(source.open(0, None).unwrap(), 1000);
    assert_eq!(source.open(1000, None).unwrap(), 0);
    assert_eq!(source.read(&mut [0u8; 8]).unwrap(), ReadOutcome::EndOfStream);
}

#[test]
fn offset_beyond_end_is_invalid_range() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/short.mp4");
    let path = seal(temp.path(), "short.wmv", &sample(10), &key);

    let err = VaultSource::new(&path, &key).open(11, None).unwrap_err();
    assert!(matches!(err, VaultError::InvalidRange { .. }));
}

#[test]
fn empty_plaintext_ends_immediately() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/empty.mp4");
    let path = seal(temp.path(), "empty.wmv", &[], &key);

    let mut source = VaultSource::new(&path, &key);
    assert_eq!(source.open(0, None).unwrap(), 0);
    assert_eq!(source.read(&mut [0u8; 64]).unwrap(), ReadOutcome::EndOfStream);
    assert_eq!(source.read(&mut [0u8; 64]).unwrap(), ReadOutcome::EndOfStream);
}

#[test]
fn empty_plaintext_with_bad_tag_fails_on_first_read() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/empty.mp4");
    let path = seal(temp.path(), "empty.wmv", &[], &key);
    flip_bit(&path, NONCE_LEN + 3);

    let mut source = VaultSource::new(&path, &key);
    assert_eq!(source.open(0, None).unwrap(), 0);
    let err = source.read(&mut [0u8; 64]).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailure { .. }));
}

#[test]
fn empty_buffer_reads_nothing() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/a.mp4");
    let path = seal(temp.path(), "a.wmv", &sample(64), &key);

    let mut source = VaultSource::new(&path, &key);
    source.open(0, None).unwrap();
    assert_eq!(source.read(&mut []).unwrap(), ReadOutcome::Data(0));
    assert_eq!(drain(&mut source).unwrap(), sample(64));
}

#[test]
fn close_is_idempotent_and_reopen_works() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/close.mp4");
    let plaintext = sample(256);
    let path = seal(temp.path(), "close.wmv", &plaintext, &key);

    let mut source = VaultSource::new(&path, &key);
    source.open(10, None).unwrap();
    source.close();
    source.close();
    assert!(!source.is_open());

    let err = source.read(&mut [0u8; 8]).unwrap_err();
    assert!(matches!(err, VaultError::InvalidRange { .. }));

    source.open(200, None).unwrap();
    assert_eq!(drain(&mut source).unwrap(), &plaintext[200..]);
}

#[test]
fn reopen_discards_the_previous_session() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/reopen.mp4");
    let plaintext = sample(512);
    let path = seal(temp.path(), "reopen.wmv", &plaintext, &key);

    let mut source = VaultSource::new(&path, &key);
    source.open(0, Some(100)).unwrap();
    let mut buf = [0u8; 50];
    source.read(&mut buf).unwrap();

    assert_eq!(source.open(300, Some(12)).unwrap(), 12);
    assert_eq!(drain(&mut source).unwrap(), &plaintext[300..312]);
}

#[test]
fn wrong_key_fails_authentication() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/mine.mp4");
    let other = key_for("/media/mine.mp4");
    let path = seal(temp.path(), "mine.wmv", &sample(5000), &key);

    let err = read_range(&path, &other, 0, None).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailure { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn any_single_bit_flip_fails_a_full_read() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/tamper.mp4");
    let plaintext = sample(777);
    let container_len = plaintext.len() + NONCE_LEN + TAG_LEN;

    for offset in [0, NONCE_LEN - 1, NONCE_LEN, NONCE_LEN + 400, container_len - TAG_LEN, container_len - 1] {
        let path = seal(temp.path(), &format!("t{offset}.wmv"), &plaintext, &key);
        flip_bit(&path, offset);

        let err = read_range(&path, &key, 0, None).unwrap_err();
        assert!(matches!(err, VaultError::AuthenticationFailure { .. }), "offset {offset}");
    }
}

#[test]
fn fixed_offset_corruption_is_detected() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/corrupt.mp4");
    let path = seal(temp.path(), "corrupt.wmv", &sample(64 * 1024), &key);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[4096..4096 + 32].fill(0);
    std::fs::write(&path, bytes).unwrap();

    let err = read_range(&path, &key, 0, None).unwrap_err();
    assert!(err.is_integrity_failure());
}

#[test]
fn truncated_containers_are_rejected() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/trunc.mp4");
    let path = seal(temp.path(), "trunc.wmv", &sample(100), &key);

    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
    let err = read_range(&path, &key, 0, None).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailure { .. }));

    std::fs::write(&path, &bytes[..27]).unwrap();
    let err = VaultSource::new(&path, &key).open(0, None).unwrap_err();
    assert!(matches!(err, VaultError::ContainerFormat { .. }));
    assert!(!wmp_vault::is_vault_container(&path));
}

#[test]
fn partial_sessions_are_not_authenticated() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/partial.mp4");
    let plaintext = sample(2000);
    let path = seal(temp.path(), "partial.wmv", &plaintext, &key);
    let container_len = std::fs::metadata(&path).unwrap().len() as usize;
    flip_bit(&path, container_len - 1);

    assert_eq!(read_range(&path, &key, 0, Some(1999)).unwrap(), &plaintext[..1999]);
    assert_eq!(read_range(&path, &key, 1, None).unwrap(), &plaintext[1..]);

    let err = read_range(&path, &key, 0, Some(2000)).unwrap_err();
    assert!(matches!(err, VaultError::AuthenticationFailure { .. }));
}

#[test]
fn failed_final_read_withholds_plaintext() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/withhold.mp4");
    let plaintext = sample(100);
    let path = seal(temp.path(), "withhold.wmv", &plaintext, &key);
    flip_bit(&path, NONCE_LEN + 99);

    let mut source = VaultSource::new(&path, &key);
    source.open(0, None).unwrap();

    let mut first = [0u8; 60];
    assert_eq!(source.read(&mut first).unwrap(), ReadOutcome::Data(60));
    assert_eq!(first, plaintext[..60]);

    let mut last = [0u8; 60];
    assert!(source.read(&mut last).is_err());
    assert_eq!(last, [0u8; 60]);
}

#[test]
fn concurrent_sessions_share_nothing() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/shared.mp4");
    let plaintext = sample(50_000);
    let path = seal(temp.path(), "shared.wmv", &plaintext, &key);

    std::thread::scope(|scope| {
        for start in [0u64, 12_345, 33_333, 49_990] {
            let (path, key, plaintext) = (&path, &key, &plaintext);
            scope.spawn(move || {
                let bytes = read_range(path, key, start, Some(5000)).unwrap();
                let end = (start as usize + 5000).min(plaintext.len());
                assert_eq!(bytes, &plaintext[start as usize..end]);
            });
        }
    });
}

#[test]
fn io_read_and_seek_behave_like_a_file() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/io.mp4");
    let plaintext = sample(3000);
    let path = seal(temp.path(), "io.wmv", &plaintext, &key);

    let mut source = VaultSource::new(&path, &key);
    let mut all = Vec::new();
    source.read_to_end(&mut all).unwrap();
    assert_eq!(all, plaintext);

    assert_eq!(source.seek(SeekFrom::Start(1234)).unwrap(), 1234);
    let mut buf = [0u8; 10];
    source.read_exact(&mut buf).unwrap();
    assert_eq!(buf, plaintext[1234..1244]);

    assert_eq!(source.seek(SeekFrom::Current(-4)).unwrap(), 1240);
    assert_eq!(source.seek(SeekFrom::End(-10)).unwrap(), 2990);
    let mut tail = Vec::new();
    source.read_to_end(&mut tail).unwrap();
    assert_eq!(tail, &plaintext[2990..]);

    let err = source.seek(SeekFrom::End(-3001)).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}

#[test]
fn io_read_reports_tampering_as_invalid_data() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/io-bad.mp4");
    let path = seal(temp.path(), "io-bad.wmv", &sample(300), &key);
    flip_bit(&path, NONCE_LEN + 5);

    let mut source = VaultSource::new(&path, &key);
    let err = std::io::copy(&mut source, &mut std::io::sink()).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn interoperates_with_one_shot_aes_gcm() {
    let temp = TempDir::new().unwrap();
    let key_bytes = [0x11u8; 32];
    let key = ProtectedKey::import(key_bytes);
    let reference = Aes256Gcm::new_from_slice(&key_bytes).unwrap();
    let plaintext = sample(12_345);

    let nonce = [0x24u8; NONCE_LEN];
    let sealed = reference.encrypt(Nonce::from_slice(&nonce), plaintext.as_slice()).unwrap();
    let path = temp.path().join("foreign.wmv");
    std::fs::write(&path, [nonce.as_slice(), sealed.as_slice()].concat()).unwrap();
    assert_eq!(read_range(&path, &key, 0, None).unwrap(), plaintext);
    assert_eq!(read_range(&path, &key, 9_000, Some(7)).unwrap(), &plaintext[9_000..9_007]);

    let mut container = Vec::new();
    VaultEncoder::new().encode(plaintext.as_slice(), &mut container, &key).unwrap();
    let (nonce, sealed) = container.split_at(NONCE_LEN);
    let opened = reference.decrypt(Nonce::from_slice(nonce), sealed).unwrap();
    assert_eq!(opened, plaintext);
}

#[test]
fn container_inspection_reports_plaintext_size() {
    let temp = TempDir::new().unwrap();
    let key = key_for("/media/inspect.mp4");
    let path = seal(temp.path(), "inspect.wmv", &sample(4321), &key);

    let info = wmp_vault::inspect(&path).unwrap();
    assert_eq!(info.plaintext_len, 4321);
    assert_eq!(info.container_len, 4321 + OVERHEAD);
    assert!(wmp_vault::is_vault_container(&path));
}
