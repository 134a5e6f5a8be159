use super::*;

#[test]
fn blit_places_and_clips() {
    let mut dst = ImageRect::new(4, 4, 1);
    let src = ImageRect::from_data(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    dst.blit(&src, 3, 3).unwrap();
    assert_eq!(dst.pixel(3, 3), &[1.0]);
    assert_eq!(dst.data.iter().filter(|v| **v != 0.0).count(), 1);

    let mut dst = ImageRect::new(4, 4, 1);
    dst.blit(&src, 1, 2).unwrap();
    assert_eq!(dst.pixel(1, 2), &[1.0]);
    assert_eq!(dst.pixel(2, 3), &[4.0]);
}

#[test]
fn blit_rejects_channel_mismatch() {
    let mut dst = ImageRect::new(2, 2, 4);
    let src = ImageRect::new(2, 2, 1);
    assert!(dst.blit(&src, 0, 0).is_err());
}

#[test]
fn crop_then_blit_restores_region() {
    let mut img = ImageRect::new(5, 5, 1);
    for (i, v) in img.data.iter_mut().enumerate() {
        *v = i as f32;
    }
    let rect = PixelRect::new(1, 2, 4, 5);
    let part = img.crop(rect).unwrap();
    assert_eq!((part.width, part.height), (3, 3));
    let mut back = ImageRect::new(5, 5, 1);
    back.blit(&part, 1, 2).unwrap();
    assert_eq!(back.pixel(3, 4), img.pixel(3, 4));
}

#[test]
fn rgba8_encodes_srgb_and_expands_gray() {
    let img = ImageRect::from_data(1, 1, 1, vec![1.0]).unwrap();
    assert_eq!(img.to_rgba8(), vec![255, 255, 255, 255]);
    let img = ImageRect::from_data(1, 1, 4, vec![0.0, 0.5, 2.0, 0.5]).unwrap();
    let px = img.to_rgba8();
    assert_eq!(px[0], 0);
    assert_eq!(px[2], 255);
    assert_eq!(px[3], 128);
    assert!(px[1] > 128);
}

#[test]
fn srgb_round_trip_is_close() {
    for v in [0.0_f32, 0.002, 0.2, 0.5, 1.0] {
        assert!((srgb_to_linear(linear_to_srgb(v)) - v).abs() < 1e-4);
    }
}

#[test]
fn from_data_checks_length() {
    assert!(ImageRect::from_data(2, 2, 4, vec![0.0; 3]).is_err());
}

#[test]
fn alpha_over_blends_straight_alpha() {
    let mut below = ImageRect::filled(1, 1, [0.0, 0.0, 1.0, 1.0]);
    let top = ImageRect::filled(1, 1, [1.0, 0.0, 0.0, 0.5]);
    below.alpha_over(&top).unwrap();
    let px = below.pixel(0, 0);
    assert!((px[0] - 0.5).abs() < 1e-6);
    assert!((px[2] - 0.5).abs() < 1e-6);
    assert_eq!(px[3], 1.0);

    let mut empty = ImageRect::new(1, 1, 4);
    empty.alpha_over(&top).unwrap();
    assert_eq!(empty.pixel(0, 0), &[1.0, 0.0, 0.0, 0.5]);
    assert!(empty.alpha_over(&ImageRect::new(2, 1, 4)).is_err());
}
