use crate::error::{RelayError, Result};
use crate::io_struct::UploadedImage;

/// The only accepted upload types. The browser runs the same checks for fast
/// feedback; this side is authoritative.
pub const ALLOWED_MIME: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn validate_upload(image: &UploadedImage) -> Result<()> {
    if !ALLOWED_MIME.contains(&image.mime.as_str()) {
        return Err(RelayError::Validation(format!(
            "unsupported image type `{}`: use a JPEG, PNG or WebP file",
            image.mime
        )));
    }
    if image.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(RelayError::Validation(format!(
            "image is too large ({} bytes): the limit is 10 MiB",
            image.bytes.len()
        )));
    }
    Ok(())
}
