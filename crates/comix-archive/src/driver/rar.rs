use std::ffi::OsString;

use super::{ArgvBuilder, Invocation, Operation, dir_arg, lookup};

const TABLE: &[(Operation, ArgvBuilder)] = &[
    (Operation::Probe, probe),
    (Operation::List, list),
    (Operation::ExtractOne, extract_one),
];

pub fn argv(op: Operation, inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    lookup(TABLE, op, inv)
}

fn probe(inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    Some(vec![
        "l".into(),
        "-p-".into(),
        "--".into(),
        inv.src.into(),
    ])
}

fn list(inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    Some(vec![
        "vb".into(),
        inv.password_flag(),
        "--".into(),
        inv.src.into(),
    ])
}

fn extract_one(inv: &Invocation<'_>) -> Option<Vec<OsString>> {
    Some(vec![
        "x".into(),
        "-kb".into(),
        inv.password_flag(),
        "-o-".into(),
        "-inul".into(),
        "--".into(),
        inv.src.into(),
        inv.member?.into(),
        dir_arg(inv.dst?),
    ])
}

/// A line of the probe listing that shows encrypted content.
///
/// Encrypted members are starred; encrypted headers make the tool fail with a
/// CRC or checksum complaint.
pub fn marks_encryption(line: &str) -> bool {
    line.starts_with('*') || line.starts_with("CRC") || line.starts_with("Checksum")
}

/// Entry name from a line of the bare listing.
pub fn listed_name(line: &str) -> Option<&str> {
    (!line.is_empty()).then_some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn strings(argv: Vec<OsString>) -> Vec<String> {
        argv.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn probe_never_prompts() {
        let inv = Invocation::new(Path::new("book.cbr")).password(Some("ignored"));
        assert_eq!(
            strings(argv(Operation::Probe, &inv).unwrap()),
            ["l", "-p-", "--", "book.cbr"]
        );
    }

    #[test]
    fn list_passes_password() {
        let inv = Invocation::new(Path::new("book.cbr")).password(Some("pw"));
        assert_eq!(
            strings(argv(Operation::List, &inv).unwrap()),
            ["vb", "-ppw", "--", "book.cbr"]
        );
    }

    #[test]
    fn extract_one_targets_directory() {
        let inv = Invocation::new(Path::new("book.cbr"))
            .member("01.jpg")
            .dst(Path::new("out"));
        let args = strings(argv(Operation::ExtractOne, &inv).unwrap());
        assert_eq!(
            args[..8],
            ["x", "-kb", "-p-", "-o-", "-inul", "--", "book.cbr", "01.jpg"]
        );
        assert!(args[8].starts_with("out") && args[8].len() == 4);
    }

    #[test]
    fn no_help_or_bulk_extract() {
        let inv = Invocation::new(Path::new("book.cbr"));
        assert!(argv(Operation::Help, &inv).is_none());
        assert!(argv(Operation::ExtractAll, &inv).is_none());
    }

    #[test]
    fn encryption_markers() {
        assert!(marks_encryption("*01.jpg"));
        assert!(marks_encryption("CRC failed in the encrypted file"));
        assert!(marks_encryption("Checksum error in the encrypted file"));
        assert!(!marks_encryption("01.jpg"));
        assert!(!marks_encryption(" *not-at-start"));
    }

    #[test]
    fn blank_listing_lines_skipped() {
        assert_eq!(listed_name("dir/01.jpg"), Some("dir/01.jpg"));
        assert_eq!(listed_name(""), None);
    }
}
