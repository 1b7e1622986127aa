//! Synthetic input generation for benchmarks and tests.

use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use rand::Rng;

const WORDS: [&str; 11] = [
    "Blue", "Yellow", "Sky", "is", "smt", "whatever", "nothing", "casual", "people", "part", "etc",
];
const MAX_ID: u32 = 10_000_000;
const MAX_WORDS: usize = 30;

/// Creates a file of `<id>. <words>` lines at least `size` bytes long.
/// Returns the number of bytes written.
pub fn create_synthetic_file(path: &Path, size: u64) -> io::Result<u64> {
    create_synthetic_file_with(path, size, &mut rand::thread_rng())
}

/// Same as [`create_synthetic_file`] using the provided random number generator.
pub fn create_synthetic_file_with<R: Rng + ?Sized>(path: &Path, size: u64, rng: &mut R) -> io::Result<u64> {
    let mut writer = io::BufWriter::new(fs::File::create(path)?);

    let mut written = 0;
    loop {
        let line = synthetic_line(rng);
        writer.write_all(line.as_bytes())?;
        written += line.len() as u64;
        if written >= size {
            break;
        }
    }
    writer.flush()?;

    log::debug!("synthetic file {} created ({} bytes)", path.display(), written);

    return Ok(written);
}

/// Generates a single newline-terminated line.
pub fn synthetic_line<R: Rng + ?Sized>(rng: &mut R) -> String {
    let words = rng.gen_range(1..MAX_WORDS);
    let text: Vec<&str> = (0..words).map(|_| WORDS[rng.gen_range(0..WORDS.len())]).collect();

    format!("{}. {}\n", rng.gen_range(0..MAX_ID), text.join(" "))
}
