// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! YOLOv8 输出解码
//! Letterbox geometry and decoding of the `[1, 4 + nc, anchors]` head

use ndarray::{s, ArrayViewD, Axis, Ix3};

use super::types::{non_max_suppression, BBox, Detection};
use crate::error::DetectError;

const CXYWH_OFFSET: usize = 4;

/// 等比缩放: 返回 (ratio, 新宽, 新高)
pub fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 解码检测头输出, 坐标还原到原图
pub fn decode_yolov8(
    output: ArrayViewD<'_, f32>,
    ratio: f32,
    width_original: f32,
    height_original: f32,
    conf: f32,
    iou: f32,
) -> Result<Vec<Detection>, DetectError> {
    let preds = output
        .into_dimensionality::<Ix3>()
        .map_err(|e| DetectError::Output(format!("expected [1, 4+nc, anchors]: {}", e)))?;
    if preds.shape()[1] <= CXYWH_OFFSET {
        return Err(DetectError::Output(format!(
            "output has {} rows, need at least {}",
            preds.shape()[1],
            CXYWH_OFFSET + 1
        )));
    }
    if ratio <= 0.0 {
        return Err(DetectError::Output(format!("invalid letterbox ratio {}", ratio)));
    }

    let mut data = Vec::new();
    for anchor in preds.axis_iter(Axis(0)) {
        for pred in anchor.axis_iter(Axis(1)) {
            let bbox = pred.slice(s![0..CXYWH_OFFSET]);
            let clss = pred.slice(s![CXYWH_OFFSET..]);

            let best = clss
                .iter()
                .copied()
                .enumerate()
                .reduce(|max, x| if x.1 > max.1 { x } else { max });
            let Some((id, confidence)) = best else {
                continue;
            };
            if confidence < conf {
                continue;
            }

            let cx = bbox[0] / ratio;
            let cy = bbox[1] / ratio;
            let w = bbox[2] / ratio;
            let h = bbox[3] / ratio;
            let bbox = BBox::from_cxcywh(cx, cy, w, h).clamp(width_original, height_original);
            if bbox.area() <= 0.0 {
                continue;
            }
            data.push(Detection::new(bbox, id, confidence));
        }
    }

    non_max_suppression(&mut data, iou);
    Ok(data)
}
