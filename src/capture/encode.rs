use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, RgbImage};

use super::frame::{Frame, PixelFormat};
use crate::error::InferenceError;

/// Encode a frame as a `data:` URI suitable for an OpenAI-style image part.
///
/// Already-compressed frames are wrapped as-is; raw RGB is JPEG-encoded first.
pub fn to_data_uri(frame: &Frame) -> Result<String, InferenceError> {
    let (mime, payload) = match frame.meta.format {
        PixelFormat::Jpeg => ("image/jpeg", STANDARD.encode(&frame.data)),
        PixelFormat::Png => ("image/png", STANDARD.encode(&frame.data)),
        PixelFormat::Rgb24 => ("image/jpeg", STANDARD.encode(encode_rgb_jpeg(frame)?)),
    };
    Ok(format!("data:{mime};base64,{payload}"))
}

fn encode_rgb_jpeg(frame: &Frame) -> Result<Vec<u8>, InferenceError> {
    let meta = &frame.meta;
    let expected = meta.width as usize * meta.height as usize * 3;
    if frame.data.len() != expected {
        return Err(InferenceError::Encode(format!(
            "rgb24 frame {} is {} bytes, expected {} for {}x{}",
            meta.sequence,
            frame.data.len(),
            expected,
            meta.width,
            meta.height
        )));
    }

    let img = RgbImage::from_raw(meta.width, meta.height, frame.data.to_vec())
        .ok_or_else(|| InferenceError::Encode("buffer does not match dimensions".into()))?;

    let mut out = Vec::with_capacity(expected / 8);
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .map_err(|e| InferenceError::Encode(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn jpeg_frames_pass_through() {
        let frame = Frame::new(1, 2, 2, PixelFormat::Jpeg, Bytes::from_static(b"\xff\xd8abc"));
        let uri = to_data_uri(&frame).unwrap();
        assert_eq!(uri, format!("data:image/jpeg;base64,{}", STANDARD.encode(b"\xff\xd8abc")));
    }

    #[test]
    fn rgb_frames_are_jpeg_encoded() {
        let frame = Frame::new(1, 4, 4, PixelFormat::Rgb24, Bytes::from(vec![128u8; 4 * 4 * 3]));
        let uri = to_data_uri(&frame).unwrap();
        let payload = uri.strip_prefix("data:image/jpeg;base64,").unwrap();
        let jpeg = STANDARD.decode(payload).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn short_rgb_buffer_is_an_encode_error() {
        let frame = Frame::new(7, 4, 4, PixelFormat::Rgb24, Bytes::from(vec![0u8; 10]));
        let err = to_data_uri(&frame).unwrap_err();
        assert!(matches!(err, InferenceError::Encode(_)));
    }
}
