use super::*;

fn spec(width: u32, height: u32, fps_num: u32) -> MovieSpec {
    MovieSpec {
        path: PathBuf::from("out/shot.mp4"),
        width,
        height,
        fps_num,
        fps_den: 1,
        background: [0, 0, 0, 255],
    }
}

#[test]
fn spec_validation_catches_bad_values() {
    assert!(spec(0, 16, 24).validate().is_err());
    assert!(spec(17, 16, 24).validate().is_err());
    assert!(spec(16, 16, 0).validate().is_err());
    assert!(spec(16, 16, 24).validate().is_ok());
}

#[test]
fn flatten_straight_over_black() {
    let mut dst = vec![0u8; 4];
    flatten_to_opaque_rgba8(&mut dst, &[255, 0, 0, 128], [0, 0, 0, 255]).unwrap();
    assert_eq!(dst, vec![128, 0, 0, 255]);
}

#[test]
fn flatten_transparent_shows_background() {
    let mut dst = vec![0u8; 8];
    flatten_to_opaque_rgba8(&mut dst, &[9, 9, 9, 0, 10, 20, 30, 255], [40, 50, 60, 255]).unwrap();
    assert_eq!(dst, vec![40, 50, 60, 255, 10, 20, 30, 255]);
    assert!(flatten_to_opaque_rgba8(&mut dst, &[0; 4], [0; 4]).is_err());
}
