// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! YUV420P → RGB 转换 (BT.601, 定点系数 ×128)
//! YUV420P to packed RGB conversion

/// 一帧YUV420P的三个平面
pub struct Yuv420p<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
    pub width: usize,
    pub height: usize,
}

impl Yuv420p<'_> {
    /// 平面长度与步长是否足够覆盖整帧
    pub fn is_consistent(&self) -> bool {
        let chroma_rows = self.height.div_ceil(2);
        self.width > 0
            && self.height > 0
            && self.y_stride >= self.width
            && self.uv_stride >= self.width.div_ceil(2)
            && self.y.len() >= self.y_stride * self.height
            && self.u.len() >= self.uv_stride * chroma_rows
            && self.v.len() >= self.uv_stride * chroma_rows
    }
}

/// 转换到紧凑RGB缓冲区 (width × height × 3)
pub fn yuv420p_to_rgb(src: &Yuv420p<'_>, out: &mut Vec<u8>) {
    out.clear();
    out.reserve(src.width * src.height * 3);

    for row in 0..src.height {
        let y_row = row * src.y_stride;
        let uv_row = (row >> 1) * src.uv_stride;

        for x in 0..src.width {
            let y_val = src.y[y_row + x] as i32;
            let u_val = src.u[uv_row + (x >> 1)] as i32 - 128;
            let v_val = src.v[uv_row + (x >> 1)] as i32 - 128;

            out.push((y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8);
            out.push((y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8);
            out.push((y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8);
        }
    }
}
