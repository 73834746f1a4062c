//! Raw image and boot code writes.

use crate::{HalError, HalResult};
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

/// Size of the MBR boot code region; partition table entries start right after it.
pub const BOOT_CODE_SIZE: usize = 440;

const COPY_CHUNK: usize = 4 * 1024 * 1024;

/// Open an image for streaming, transparently decompressing `.xz` files.
pub fn open_image(path: &Path) -> HalResult<Box<dyn Read + Send>> {
    let input = fs::File::open(path)?;
    if path.extension().is_some_and(|e| e == "xz") {
        Ok(Box::new(xz2::read::XzDecoder::new(input)))
    } else {
        Ok(Box::new(input))
    }
}

pub trait FlashOps {
    /// Stream an image onto `target` block by block, returning the number of bytes written.
    ///
    /// `on_progress` receives the running byte count after every chunk.
    fn flash_raw_image(
        &self,
        image_path: &Path,
        target: &Path,
        on_progress: &mut dyn FnMut(u64),
    ) -> HalResult<u64>;

    /// Write the first [`BOOT_CODE_SIZE`] bytes of `code_file` to the start of `disk`.
    fn write_boot_code(&self, code_file: &Path, disk: &Path) -> HalResult<()>;
}

pub(crate) fn stream_image(
    image_path: &Path,
    target: &Path,
    on_progress: &mut dyn FnMut(u64),
) -> HalResult<u64> {
    let mut reader = open_image(image_path)?;
    let mut out = fs::OpenOptions::new()
        .write(true)
        .truncate(false)
        .open(target)?;
    // Regular files (tests, image-to-file) are rewritten from scratch; block devices ignore this.
    if out.metadata()?.is_file() {
        out.set_len(0)?;
    }

    let mut buf = vec![0u8; COPY_CHUNK];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        out.write_all(&buf[..n])?;
        written += n as u64;
        on_progress(written);
    }
    out.flush()?;
    out.sync_all()?;
    Ok(written)
}

pub(crate) fn write_boot_code_file(code_file: &Path, disk: &Path) -> HalResult<()> {
    let code = fs::read(code_file)?;
    if code.is_empty() {
        return Err(HalError::ValidationFailed(format!(
            "boot code file {} is empty",
            code_file.display()
        )));
    }
    let len = code.len().min(BOOT_CODE_SIZE);
    let mut out = fs::OpenOptions::new()
        .write(true)
        .truncate(false)
        .open(disk)?;
    out.write_all(&code[..len])?;
    out.sync_all()?;
    Ok(())
}
