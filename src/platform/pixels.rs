use image::RgbaImage;

/// Repacks a locked RGB32 video buffer (B, G, R, X per pixel) into RGBA.
///
/// A negative `stride` means the rows are stored bottom-up. Returns `None`
/// when `data` is too short for the given geometry.
pub fn bgrx_to_rgba(data: &[u8], width: u32, height: u32, stride: i32) -> Option<RgbaImage> {
    let row_bytes = width as usize * 4;
    let pitch = stride.unsigned_abs() as usize;
    if width == 0 || height == 0 || pitch < row_bytes {
        return None;
    }
    if data.len() < pitch * (height as usize - 1) + row_bytes {
        return None;
    }

    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let src_row = if stride < 0 { height as usize - 1 - y } else { y };
        let row = &data[src_row * pitch..src_row * pitch + row_bytes];
        for px in row.chunks_exact(4) {
            out.extend_from_slice(&[px[2], px[1], px[0], 255]);
        }
    }

    RgbaImage::from_raw(width, height, out)
}
