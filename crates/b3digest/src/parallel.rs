//! Rayon integration for hashing many files at once.
//!
//! Each file gets its own [`Blake3`], so files are hashed independently on the
//! rayon thread pool. Results come back in input order.

use std::path::Path;

use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Blake3, DigestError, ReaderConfig};

/// Compute the digest of every file in `paths` in parallel.
///
/// # Example
///
/// ```no_run
/// use b3digest::parallel::digest_files;
///
/// let paths = ["file1.txt", "file2.txt", "file3.txt"];
/// for (path, result) in paths.iter().zip(digest_files(&paths)) {
///     match result {
///         Ok(digest) => println!("{path}: {digest}"),
///         Err(e) => println!("{path}: error - {e}"),
///     }
/// }
/// ```
pub fn digest_files<P: AsRef<Path> + Sync>(paths: &[P]) -> Vec<Result<Blake3, DigestError>> {
    digest_files_with_config(paths, ReaderConfig::default())
}

/// Like [`digest_files`] with an explicit read size.
#[cfg_attr(
    feature = "tracing",
    instrument(skip_all, fields(files = paths.len()), name = "digest_files")
)]
pub fn digest_files_with_config<P: AsRef<Path> + Sync>(
    paths: &[P],
    config: ReaderConfig,
) -> Vec<Result<Blake3, DigestError>> {
    paths
        .par_iter()
        .map(|path| -> Result<Blake3, DigestError> {
            let mut hasher = Blake3::new();
            hasher.update_file_with_config(path, config)?;
            Ok(hasher)
        })
        .collect()
}

/// Compute raw digests of in-memory inputs in parallel.
pub fn digest_all<T: AsRef<[u8]> + Sync>(inputs: &[T]) -> Vec<[u8; Blake3::DIGEST_LENGTH]> {
    inputs.par_iter().map(crate::digest).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn parallel_digest_matches_sequential() {
        let data: Vec<Vec<u8>> = (0..16)
            .map(|i| format!("input number {i}").repeat(i * 100).into_bytes())
            .collect();

        let parallel = digest_all(&data);
        let sequential: Vec<_> = data.iter().map(crate::digest).collect();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn digest_files_preserves_order() {
        let dir = tempdir().expect("tempdir");

        let mut paths = Vec::new();
        for i in 0..6 {
            let path = dir.path().join(format!("file{i}.txt"));
            let mut file = std::fs::File::create(&path).expect("create file");
            writeln!(file, "content of file {i}").expect("write file");
            paths.push(path);
        }

        let results = digest_files(&paths);
        assert_eq!(results.len(), paths.len());
        for (i, result) in results.iter().enumerate() {
            let expected = crate::hexdigest(format!("content of file {i}\n"));
            assert_eq!(result.as_ref().expect("file hashed").hexdigest(), expected);
        }
    }

    #[test]
    fn digest_files_reports_missing_per_file() {
        let dir = tempdir().expect("tempdir");
        let present = dir.path().join("present.txt");
        std::fs::write(&present, b"hoge").expect("write file");
        let missing = dir.path().join("missing.txt");

        let results = digest_files(&[present, missing]);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().expect("present file").hexdigest(),
            crate::hexdigest("hoge")
        );
        assert!(matches!(results[1], Err(DigestError::Io { .. })));
    }
}
