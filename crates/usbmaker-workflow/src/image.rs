//! Raw Image Writer: whole-device writes with read-back verification.

use sha2::{Digest, Sha512};
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use usbmaker_error::{StepContext, WorkflowResult};
use usbmaker_hal::{open_image, UsbHal};

/// Read size for hashing; bounds memory regardless of image size.
pub const VERIFY_CHUNK: usize = 8 * 1024 * 1024;

pub struct RawImageWriter<'a> {
    hal: &'a dyn UsbHal,
}

impl<'a> RawImageWriter<'a> {
    pub fn new(hal: &'a dyn UsbHal) -> Self {
        Self { hal }
    }

    /// Stream `source` onto `device`. `on_progress` gets `(bytes_written, source_file_len)`.
    ///
    /// For `.xz` sources the byte count is of decompressed data, so it can run
    /// past the file length; callers clamp.
    pub fn write_image(
        &self,
        source: &Path,
        device: &Path,
        on_progress: &mut dyn FnMut(u64, u64),
    ) -> WorkflowResult<u64> {
        let total = fs::metadata(source).step("read source image")?.len();
        log::info!("💾 Writing {} to {}", source.display(), device.display());
        let written = self
            .hal
            .flash_raw_image(source, device, &mut |n| on_progress(n, total))
            .step("write image")?;
        self.hal.sync().step("sync")?;
        log::info!("💾 Wrote {} bytes", written);
        Ok(written)
    }

    /// Compare the SHA-512 of `source` (decompressed) with the same number of bytes read back from `device`.
    pub fn verify_write(&self, source: &Path, device: &Path) -> WorkflowResult<bool> {
        log::info!("🔎 Verifying {} against {}", device.display(), source.display());
        let image = open_image(source).step("open source image")?;
        let (expected, len) = sha512_stream(image).step("hash source image")?;

        let dev = fs::File::open(device).step("read back device")?;
        let (actual, read) = sha512_stream(dev.take(len)).step("read back device")?;

        if read != len {
            log::warn!("⚠️ device returned {} of {} bytes", read, len);
            return Ok(false);
        }
        Ok(expected == actual)
    }
}

/// Digest and length of everything `reader` yields.
pub fn sha512_stream(mut reader: impl Read) -> io::Result<(Vec<u8>, u64)> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; VERIFY_CHUNK];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize().to_vec(), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use usbmaker_hal::{FakeHal, Operation};

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[test]
    fn identical_write_verifies() {
        let tmp = tempdir().unwrap();
        let image = tmp.path().join("os.img");
        let device = tmp.path().join("sdb");
        fs::write(&image, pattern(100_000)).unwrap();
        fs::write(&device, vec![0u8; 200_000]).unwrap();

        let hal = FakeHal::new();
        let writer = RawImageWriter::new(&hal);
        let mut seen = Vec::new();
        let n = writer
            .write_image(&image, &device, &mut |done, total| seen.push((done, total)))
            .unwrap();
        assert_eq!(n, 100_000);
        assert_eq!(seen.last(), Some(&(100_000, 100_000)));
        assert!(writer.verify_write(&image, &device).unwrap());
        assert!(hal.has_operation(|op| matches!(op, Operation::Sync)));
    }

    #[test]
    fn single_flipped_byte_fails_verification() {
        let tmp = tempdir().unwrap();
        let image = tmp.path().join("os.img");
        let device = tmp.path().join("sdb");
        let data = pattern(50_000);
        fs::write(&image, &data).unwrap();

        let mut corrupted = data.clone();
        corrupted[12_345] ^= 0x01;
        corrupted.extend_from_slice(&[0xAA; 4096]);
        fs::write(&device, corrupted).unwrap();

        let hal = FakeHal::new();
        assert!(!RawImageWriter::new(&hal).verify_write(&image, &device).unwrap());
    }

    #[test]
    fn short_device_fails_verification() {
        let tmp = tempdir().unwrap();
        let image = tmp.path().join("os.img");
        let device = tmp.path().join("sdb");
        let data = pattern(10_000);
        fs::write(&image, &data).unwrap();
        fs::write(&device, &data[..9_000]).unwrap();

        let hal = FakeHal::new();
        assert!(!RawImageWriter::new(&hal).verify_write(&image, &device).unwrap());
    }

    #[test]
    fn xz_image_verifies_against_decompressed_stream() {
        let tmp = tempdir().unwrap();
        let image = tmp.path().join("os.img.xz");
        let device = tmp.path().join("sdb");
        let data = pattern(300_000);
        let mut enc = xz2::write::XzEncoder::new(fs::File::create(&image).unwrap(), 6);
        enc.write_all(&data).unwrap();
        enc.finish().unwrap();
        fs::write(&device, b"").unwrap();

        let hal = FakeHal::new();
        let writer = RawImageWriter::new(&hal);
        let n = writer.write_image(&image, &device, &mut |_, _| {}).unwrap();
        assert_eq!(n, data.len() as u64);
        assert!(writer.verify_write(&image, &device).unwrap());
    }
}
