// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! YOLOv8 ONNX检测器 (ort)
//! YOLOv8 detector running an ONNX export through ONNX Runtime
//!
//! 输入 `images` [1, 3, S, S], 输出 `output0` [1, 4 + nc, anchors]

use std::time::Instant;

use fast_image_resize as fr;
use ndarray::Array4;
use ort::execution_providers::{CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider};
use ort::inputs;
use ort::session::Session;
use ort::value::TensorRef;
use tracing::{debug, info};

use super::annotate::Annotator;
use super::fetch::{default_cache_dir, resolve_model};
use super::postprocess::{decode_yolov8, scale_wh};
use super::{Backend, Detector, DetectorConfig};
use crate::error::{DetectError, ModelLoadError};
use crate::frame::{AnnotatedFrame, Frame};

const INPUT_NAME: &str = "images";
const OUTPUT_NAME: &str = "output0";
const PAD_VALUE: f32 = 144.0 / 255.0;

fn provider_available(backend: Backend) -> bool {
    match backend {
        Backend::Cuda => CUDAExecutionProvider::default().is_available().unwrap_or(false),
        Backend::CoreMl => CoreMLExecutionProvider::default()
            .is_available()
            .unwrap_or(false),
        Backend::Cpu => true,
    }
}

pub struct YoloDetector {
    session: Session,
    backend: Backend,
    input_size: u32,
    conf: f32,
    iou: f32,
    annotator: Annotator,
    input: Array4<f32>,
    resizer: fr::Resizer,

    // 统计
    count: u64,
    last: Instant,
}

impl YoloDetector {
    /// 加载模型, 后端在此一次性确定
    pub fn load(config: &DetectorConfig) -> Result<Self, ModelLoadError> {
        let model = resolve_model(
            &config.model,
            config.model_url.as_deref(),
            &default_cache_dir(),
        )?;

        let backend = Backend::select(config.backend, provider_available);
        info!("⚙️ 推理后端: {} (偏好 {:?})", backend, config.backend);

        let builder = Session::builder().map_err(|e| ModelLoadError::Runtime(e.to_string()))?;
        let builder = match backend {
            Backend::Cuda => builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(|e| ModelLoadError::Runtime(e.to_string()))?,
            Backend::CoreMl => builder
                .with_execution_providers([CoreMLExecutionProvider::default().build()])
                .map_err(|e| ModelLoadError::Runtime(e.to_string()))?,
            Backend::Cpu => builder,
        };
        let session = builder
            .commit_from_file(&model)
            .map_err(|e| ModelLoadError::Runtime(format!("{}: {}", model.display(), e)))?;
        info!("✅ YOLOv8 检测模型加载成功: {}", model.display());

        let annotator = match &config.font {
            Some(path) => Annotator::from_font_file(path)?,
            None => Annotator::default(),
        };

        let size = config.input_size as usize;
        Ok(Self {
            session,
            backend,
            input_size: config.input_size,
            conf: config.conf,
            iou: config.iou,
            annotator,
            input: Array4::from_elem((1, 3, size, size), PAD_VALUE),
            resizer: fr::Resizer::new(),
            count: 0,
            last: Instant::now(),
        })
    }

    /// Letterbox: 等比缩放后左上对齐, 其余填充144
    fn preprocess(&mut self, frame: &Frame) -> Result<f32, DetectError> {
        let (w0, h0) = (frame.width(), frame.height());
        let s = self.input_size as f32;
        let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, s, s);
        let (w_new, h_new) = ((w_new as u32).max(1), (h_new as u32).max(1));

        let src = fr::images::Image::from_vec_u8(
            w0,
            h0,
            frame.image().as_raw().clone(),
            fr::PixelType::U8x3,
        )
        .map_err(|e| DetectError::MalformedFrame(e.to_string()))?;
        let mut dst = fr::images::Image::new(w_new, h_new, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new()
                    .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| DetectError::Inference(format!("resize: {}", e)))?;

        self.input.fill(PAD_VALUE);
        let row = w_new as usize * 3;
        for (y, line) in dst.buffer().chunks_exact(row).enumerate() {
            for (x, px) in line.chunks_exact(3).enumerate() {
                self.input[[0, 0, y, x]] = px[0] as f32 / 255.0;
                self.input[[0, 1, y, x]] = px[1] as f32 / 255.0;
                self.input[[0, 2, y, x]] = px[2] as f32 / 255.0;
            }
        }
        Ok(ratio)
    }

    fn log_stats(&mut self, inference_ms: f64) {
        self.count += 1;
        let elapsed = self.last.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            debug!(
                "🔍 检测统计: {:.1}次/秒 | 最近耗时 {:.1}ms | 后端 {}",
                self.count as f64 / elapsed,
                inference_ms,
                self.backend
            );
            self.count = 0;
            self.last = Instant::now();
        }
    }
}

impl Detector for YoloDetector {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn infer(&mut self, frame: Frame) -> Result<AnnotatedFrame, DetectError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(DetectError::MalformedFrame(format!(
                "{}x{} frame",
                frame.width(),
                frame.height()
            )));
        }

        let start = Instant::now();
        let ratio = self.preprocess(&frame)?;
        let (w0, h0) = (frame.width() as f32, frame.height() as f32);

        let input = TensorRef::from_array_view(self.input.view())
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let outputs = self
            .session
            .run(inputs![INPUT_NAME => input])
            .map_err(|e| DetectError::Inference(e.to_string()))?;
        let output = outputs[OUTPUT_NAME]
            .try_extract_array::<f32>()
            .map_err(|e| DetectError::Output(e.to_string()))?;
        let detections = decode_yolov8(output, ratio, w0, h0, self.conf, self.iou)?;
        drop(outputs);

        let mut image = frame.into_image();
        self.annotator.draw(&mut image, &detections);

        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.log_stats(inference_ms);

        Ok(AnnotatedFrame {
            image,
            detections,
            inference_ms,
        })
    }
}
