//! Cover image decoding for hosted builds.
//!
//! EPUB covers arrive as JPEG or PNG blobs; [`decode_cover_bytes`] turns
//! one into the 8-bit grayscale format the rest of the crate works with.
//! Firmware targets with their own decoders implement [`EbookSource`]
//! without this module.
//!
//! [`EbookSource`]: crate::ebook::EbookSource

use crate::covers;
use crate::ebook::{Dimensions, GrayBitmap};

/// Decode an image blob into a grayscale bitmap no larger than `max` in
/// either dimension. Oversized images are scaled down (aspect preserved);
/// smaller ones are kept as-is. `None` when the bytes do not decode or the
/// result does not fit in `u16` dimensions.
pub fn decode_cover_bytes(bytes: &[u8], max: Dimensions) -> Option<GrayBitmap> {
    if max.width == 0 || max.height == 0 {
        return None;
    }

    let decoded = match image::load_from_memory(bytes) {
        Ok(img) => img,
        Err(err) => {
            log::debug!("cover image does not decode: {}", err);
            return None;
        }
    };
    let luma = decoded.into_luma8();

    let width = u16::try_from(luma.width()).ok()?;
    let height = u16::try_from(luma.height()).ok()?;
    let src = GrayBitmap::new(Dimensions::new(width, height), luma.into_raw())?;

    if src.dim.width <= max.width && src.dim.height <= max.height {
        return Some(src);
    }
    let fitted = covers::fit_within(src.dim, max);
    Some(covers::resize_nearest(&src, fitted))
}
