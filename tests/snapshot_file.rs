use anyhow::Result;
use oorandom::Rand64;

use selfie::codec::SnapshotReader;
use selfie::{SelfieError, Snapshot, SnapshotFile, SnapshotValue};

const APPLE: &str = "╔═ 📷 Suite ═╗\n\
{\"v\":1}\n\
╔═ Apple ═╗\n\
Granny Smith\n\
╔═ Apple[color] ═╗\n\
green\n\
╔═ Apple[crisp] ═╗\n\
yes\n\
╔═ [end of file] ═╗\n";

#[test]
fn empty_file_roundtrip() -> Result<()> {
    let file = SnapshotFile::create_empty_with_unix_newlines(true);
    let text = file.serialize_to_string();
    assert_eq!(text, "╔═ [end of file] ═╗\n");

    let parsed = SnapshotFile::parse_str(&text)?;
    assert!(parsed.is_empty());
    assert_eq!(parsed.metadata(), None);
    Ok(())
}

#[test]
fn metadata_and_facets_serialize_to_fixed_text() -> Result<()> {
    let file = SnapshotFile::create_empty_with_unix_newlines(true);
    file.set_metadata("Suite", "{\"v\":1}");
    // facets are inserted out of order on purpose
    let apple = Snapshot::of("Granny Smith")
        .plus_facet("crisp", "yes")?
        .plus_facet("color", "green")?;
    file.set_at_test_time("Apple", apple);

    assert_eq!(file.serialize_to_string(), APPLE);

    let parsed = SnapshotFile::parse_str(APPLE)?;
    assert_eq!(parsed, file);
    assert_eq!(
        parsed.metadata(),
        Some(("Suite".to_string(), "{\"v\":1}".to_string()))
    );
    Ok(())
}

#[test]
fn binary_facet_is_base64() -> Result<()> {
    let file = SnapshotFile::create_empty_with_unix_newlines(true);
    file.set_at_test_time("mood", Snapshot::of("ok").plus_facet("raw", &b"sad"[..])?);

    let text = file.serialize_to_string();
    assert_eq!(
        text,
        "╔═ mood ═╗\nok\n╔═ mood[raw] ═╗ base64 length 3 bytes\nc2Fk\n╔═ [end of file] ═╗\n"
    );

    let parsed = SnapshotFile::parse_str(&text)?;
    let mood = parsed.get("mood").expect("mood");
    assert_eq!(mood.subject_or_facet("raw")?.value_binary()?, b"sad");
    Ok(())
}

#[test]
fn windows_newlines_are_kept() -> Result<()> {
    let text = APPLE.replace('\n', "\r\n");
    let parsed = SnapshotFile::parse_str(&text)?;
    assert!(!parsed.unix_newlines());
    assert_eq!(
        parsed.get("Apple").expect("Apple").subject().value_string()?,
        "Granny Smith"
    );
    assert_eq!(parsed.serialize_to_string(), text);
    Ok(())
}

#[test]
fn carriage_returns_become_newlines_before_writing() -> Result<()> {
    for unix in [true, false] {
        let file = SnapshotFile::create_empty_with_unix_newlines(unix);
        file.set_at_test_time("cr", Snapshot::of("a\r").plus_facet("mid", "x\ry\r\nz")?);
        let text = file.serialize_to_string();
        let parsed = SnapshotFile::parse_str(&text)?;
        let cr = parsed.get("cr").expect("cr");
        assert_eq!(cr.subject().value_string()?, "a\n");
        assert_eq!(cr.subject_or_facet("mid")?.value_string()?, "x\ny\nz");
        assert_eq!(parsed, file, "text:\n{}", text);
    }
    Ok(())
}

#[test]
fn body_lines_that_look_like_headers_are_escaped() -> Result<()> {
    let file = SnapshotFile::create_empty_with_unix_newlines(true);
    let tricky = "╔═ not a header ═╗\nplain\n\u{10441}marker";
    file.set_at_test_time("t", Snapshot::of(tricky));

    let text = file.serialize_to_string();
    assert!(!text.contains("\n╔═ not a header"));
    let parsed = SnapshotFile::parse_str(&text)?;
    assert_eq!(parsed.get("t").expect("t").subject().value_string()?, tricky);
    Ok(())
}

#[test]
fn parse_errors_carry_the_line() -> Result<()> {
    let text = "╔═ A ═╗\na\n╔═ A ═╗\nagain\n╔═ [end of file] ═╗\n";
    let err = match SnapshotFile::parse_str(text) {
        Ok(_) => anyhow::bail!("duplicate key must not parse"),
        Err(e) => e,
    };
    match err {
        SelfieError::Parse { line, .. } => assert!(line >= 3, "line {}", line),
        other => anyhow::bail!("unexpected error {:?}", other),
    }

    let orphan_facet = "╔═ A[color] ═╗\nred\n";
    let mut reader = SnapshotReader::of(orphan_facet);
    assert!(reader.peek_key().is_err());

    let bad_length = "╔═ A ═╗ base64 length 4 bytes\nc2Fk\n";
    assert!(SnapshotFile::parse_str(bad_length).is_err());
    Ok(())
}

#[test]
fn set_at_test_time_is_dirty_only_on_change() -> Result<()> {
    let file = SnapshotFile::parse_str(APPLE)?;
    assert!(!file.was_set_at_test_time());
    let same = file.get("Apple").expect("Apple");
    file.set_at_test_time("Apple", same);
    assert!(!file.was_set_at_test_time());
    file.set_at_test_time("Banana", Snapshot::of("yellow"));
    assert!(file.was_set_at_test_time());

    file.remove_all_indices(&[0])?;
    assert_eq!(file.snapshots().len(), 1);
    assert!(file.remove_all_indices(&[5]).is_err());
    Ok(())
}

// ----- randomized round-trip -----

const KEY_CHARS: &[char] = &['a', 'b', 'Z', '/', '[', ']', '\\', '╔', '═', '╗', '\t', '-'];
const BODY_CHARS: &[char] = &[
    'a', ' ', '\n', '\r', '╔', '═', '╗', '[', ']', '\\', '\t', '\u{10441}', '\u{10443}', 'é', '"',
];

fn random_string(rng: &mut Rand64, pool: &[char], max_len: u64) -> String {
    let len = rng.rand_range(0..max_len + 1);
    (0..len)
        .map(|_| pool[rng.rand_range(0..pool.len() as u64) as usize])
        .collect()
}

fn random_key(rng: &mut Rand64) -> String {
    loop {
        let k = random_string(rng, KEY_CHARS, 8);
        if !k.is_empty() && !k.starts_with(' ') && !k.ends_with(' ') {
            return k;
        }
    }
}

fn random_value(rng: &mut Rand64) -> SnapshotValue {
    if rng.rand_range(0..5) == 0 {
        let len = rng.rand_range(0..120) as usize;
        SnapshotValue::binary((0..len).map(|_| rng.rand_u64() as u8).collect::<Vec<u8>>())
    } else {
        SnapshotValue::string(random_string(rng, BODY_CHARS, 24))
    }
}

#[test]
fn random_files_roundtrip() -> Result<()> {
    let mut rng = Rand64::new(0x5e1f_1e);
    for _ in 0..300 {
        let file = SnapshotFile::create_empty_with_unix_newlines(rng.rand_range(0..2) == 0);
        for _ in 0..rng.rand_range(0..5) {
            let mut snapshot = Snapshot::of(random_value(&mut rng));
            for _ in 0..rng.rand_range(0..3) {
                snapshot = snapshot.plus_or_replace(&random_key(&mut rng), random_value(&mut rng));
            }
            file.set_at_test_time(&random_key(&mut rng), snapshot);
        }
        let text = file.serialize_to_string();
        let parsed = SnapshotFile::parse_str(&text)?;
        assert_eq!(parsed, file, "text:\n{}", text);
    }
    Ok(())
}
