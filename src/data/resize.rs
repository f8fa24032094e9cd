use image::{imageops, imageops::FilterType, RgbImage};
use log::debug;
use ndarray::{Array4, ArrayView4, Axis};

use crate::{
    config::Resolution,
    error::{PrepErr, Result},
};

/// Bilinearly resizes every `(H, W, 3)` image in `images` to `target`.
///
/// Pixel values stay `u8`. Image order is preserved.
///
/// # Errors
/// * `PrepErr::Shape` if the images are not three-channel.
/// * `PrepErr::InvalidConfig` if `target` has a zero side or does not fit
///   in `u32`.
pub fn resize_images(images: ArrayView4<'_, u8>, target: Resolution) -> Result<Array4<u8>> {
    let (n, h, w, c) = images.dim();
    if c != 3 {
        return Err(PrepErr::Shape {
            what: "channels",
            got: c,
            expected: 3,
        });
    }
    let (out_w, out_h) = match (u32::try_from(target.width), u32::try_from(target.height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(PrepErr::InvalidConfig(format!(
                "cannot resize to {}x{}",
                target.height, target.width
            )))
        }
    };

    if (h, w) == (target.height, target.width) {
        return Ok(images.as_standard_layout().into_owned());
    }

    let (in_w, in_h) = match (u32::try_from(w), u32::try_from(h)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(PrepErr::InvalidConfig(format!(
                "source images of {h}x{w} are too large"
            )))
        }
    };

    debug!("resizing {n} images from {h}x{w} to {out_h}x{out_w}");

    let mut out = Array4::<u8>::zeros((n, target.height, target.width, 3));
    for (src, mut dst) in images.axis_iter(Axis(0)).zip(out.axis_iter_mut(Axis(0))) {
        let raw: Vec<u8> = src.iter().copied().collect();
        let img = RgbImage::from_raw(in_w, in_h, raw).ok_or(PrepErr::Shape {
            what: "image bytes",
            got: src.len(),
            expected: h * w * 3,
        })?;
        let resized = imageops::resize(&img, out_w, out_h, FilterType::Triangle);

        for (d, s) in dst.iter_mut().zip(resized.into_raw()) {
            *d = s;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: Resolution = Resolution {
        height: 224,
        width: 224,
    };

    #[test]
    fn resizes_every_image_and_keeps_order() {
        let images = Array4::from_shape_fn((3, 32, 32, 3), |(n, ..)| (n * 50) as u8);
        let resized = resize_images(images.view(), TARGET).unwrap();
        assert_eq!(resized.dim(), (3, 224, 224, 3));
        for (i, image) in resized.axis_iter(Axis(0)).enumerate() {
            assert!(image.iter().all(|&p| p == (i * 50) as u8));
        }
    }

    #[test]
    fn colour_channels_are_kept_apart() {
        let images = Array4::from_shape_fn((1, 32, 32, 3), |(_, _, _, c)| [10u8, 120, 240][c]);
        let resized = resize_images(images.view(), TARGET).unwrap();
        for pixel in resized.rows() {
            assert_eq!(pixel.to_vec(), [10, 120, 240]);
        }
    }

    #[test]
    fn same_size_is_a_copy() {
        let images = Array4::from_shape_fn((2, 4, 4, 3), |(n, h, w, c)| (n + h + w + c) as u8);
        let out = resize_images(
            images.view(),
            Resolution {
                height: 4,
                width: 4,
            },
        )
        .unwrap();
        assert_eq!(out, images);
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let images = Array4::<u8>::zeros((0, 32, 32, 3));
        let out = resize_images(images.view(), TARGET).unwrap();
        assert_eq!(out.dim(), (0, 224, 224, 3));
    }

    #[test]
    fn bad_inputs_are_rejected() {
        let grey = Array4::<u8>::zeros((1, 8, 8, 1));
        assert!(matches!(
            resize_images(grey.view(), TARGET),
            Err(PrepErr::Shape { got: 1, .. })
        ));

        let rgb = Array4::<u8>::zeros((1, 8, 8, 3));
        let zero = Resolution {
            height: 0,
            width: 16,
        };
        assert!(matches!(
            resize_images(rgb.view(), zero),
            Err(PrepErr::InvalidConfig(_))
        ));
    }
}
