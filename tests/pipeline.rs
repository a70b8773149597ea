use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};

use songshu::config::{ClassNameTable, DetectorConfig};
use songshu::frame::Frame;
use songshu::input::WatchDirectory;
use songshu::model::{Detector, ReplayLayout, ReplayModel};
use songshu::output::draw::DETECTION_GLYPH;
use songshu::output::{Annotator, Destination, DirectoryRouter, Render, RouteOutcome};
use songshu::postprocess::{Detection, Postprocessor};
use songshu::task::{OneShotTask, Task, TaskSummary, WatchTask};

// 回放张量固定为两个预测
const PREDICTIONS: usize = 2;

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
  let mut buffer = Cursor::new(Vec::new());
  RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]))
    .write_to(&mut buffer, format)
    .unwrap();
  buffer.into_inner()
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
  encoded(width, height, ImageFormat::Png)
}

fn write_tensor(path: &Path, values: &[f32]) {
  let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
  std::fs::write(path, bytes).unwrap();
}

fn detector(tensors: &Path) -> Detector<ReplayModel> {
  let config = DetectorConfig::new(
    640,
    0.5,
    0.45,
    ClassNameTable::parse("squirrel").unwrap(),
  )
  .unwrap();
  let model = ReplayModel::new(tensors, ReplayLayout::RowMajor, PREDICTIONS);
  Detector::new(model, Postprocessor::new(config))
}

fn router(root: &Path) -> DirectoryRouter {
  DirectoryRouter::builder()
    .output(Destination::new(root.join("out")))
    .annotated(Destination::new(root.join("annotated")))
    .no_detection(Destination::new(root.join("empty")))
    .failed(Destination::new(root.join("failed")))
    .build()
    .unwrap()
}

#[test]
fn watch_task_routes_every_file() {
  let root = tempfile::tempdir().unwrap();
  let inbox = root.path().join("inbox");
  let tensors = root.path().join("tensors");
  std::fs::create_dir_all(&inbox).unwrap();
  std::fs::create_dir_all(&tensors).unwrap();

  // 两个重叠框，NMS 后剩一个
  std::fs::write(inbox.join("a-hit.png"), png_bytes(320, 240)).unwrap();
  write_tensor(
    &tensors.join("a-hit.f32"),
    &[
      100.0, 100.0, 50.0, 50.0, 0.9, //
      105.0, 105.0, 50.0, 50.0, 0.8,
    ],
  );

  std::fs::write(inbox.join("b-quiet.png"), png_bytes(320, 240)).unwrap();
  write_tensor(
    &tensors.join("b-quiet.f32"),
    &[
      100.0, 100.0, 50.0, 50.0, 0.4, //
      300.0, 200.0, 50.0, 50.0, 0.1,
    ],
  );

  std::fs::write(inbox.join("c-broken.jpg"), b"not an image").unwrap();
  std::fs::write(inbox.join("notes.txt"), b"ignored").unwrap();

  let input = WatchDirectory::new(&inbox).once(true);
  let summary = WatchTask::default()
    .run_task(input, &detector(&tensors), &router(root.path()))
    .unwrap();

  assert_eq!(
    summary,
    TaskSummary {
      processed: 2,
      with_detections: 1,
      without_detections: 1,
      failed: 1,
      detections: 1,
    }
  );

  assert!(!inbox.join("a-hit.png").exists());
  assert!(!inbox.join("b-quiet.png").exists());
  assert!(!inbox.join("c-broken.jpg").exists());
  assert!(inbox.join("notes.txt").exists());

  assert_eq!(
    std::fs::read(root.path().join("out").join("a-hit.png")).unwrap(),
    png_bytes(320, 240)
  );
  let annotated = std::fs::read(root.path().join("annotated").join("a-hit.png")).unwrap();
  let annotated = image::load_from_memory(&annotated).unwrap().to_rgb8();
  assert_eq!(annotated.dimensions(), (320, 240));

  assert!(root.path().join("empty").join("b-quiet.png").exists());
  assert!(!root.path().join("annotated").join("b-quiet.png").exists());
  assert_eq!(
    std::fs::read(root.path().join("failed").join("c-broken.jpg")).unwrap(),
    b"not an image"
  );
}

#[test]
fn missing_tensor_sends_file_to_failed() {
  let root = tempfile::tempdir().unwrap();
  let inbox = root.path().join("inbox");
  std::fs::create_dir_all(&inbox).unwrap();
  std::fs::write(inbox.join("orphan.png"), png_bytes(64, 64)).unwrap();

  let summary = OneShotTask
    .run_task(
      WatchDirectory::new(&inbox).once(true),
      &detector(&root.path().join("tensors")),
      &router(root.path()),
    )
    .unwrap();

  assert_eq!(summary.failed, 1);
  assert_eq!(summary.processed, 0);
  assert!(root.path().join("failed").join("orphan.png").exists());
}

#[test]
fn class_count_mismatch_sends_file_to_failed() {
  let root = tempfile::tempdir().unwrap();
  let inbox = root.path().join("inbox");
  let tensors = root.path().join("tensors");
  std::fs::create_dir_all(&inbox).unwrap();
  std::fs::create_dir_all(&tensors).unwrap();

  // 按两个类别记录的张量，配置只有一个类别
  std::fs::write(inbox.join("two-class.png"), png_bytes(64, 64)).unwrap();
  write_tensor(
    &tensors.join("two-class.f32"),
    &[
      100.0, 100.0, 50.0, 50.0, 0.9, 0.1, //
      104.0, 100.0, 50.0, 50.0, 0.2, 0.7,
    ],
  );

  let summary = WatchTask::default()
    .run_task(
      WatchDirectory::new(&inbox).once(true),
      &detector(&tensors),
      &router(root.path()),
    )
    .unwrap();

  assert_eq!(summary.failed, 1);
  assert_eq!(summary.processed, 0);
  assert_eq!(summary.detections, 0);
  assert!(root.path().join("failed").join("two-class.png").exists());
  assert!(!root.path().join("out").join("two-class.png").exists());
  assert!(!root.path().join("annotated").join("two-class.png").exists());
}

#[test]
fn failed_route_is_not_also_routed() {
  let root = tempfile::tempdir().unwrap();
  let inbox = root.path().join("inbox");
  let tensors = root.path().join("tensors");
  std::fs::create_dir_all(&inbox).unwrap();
  std::fs::create_dir_all(&tensors).unwrap();
  // 标注目录无法创建
  std::fs::write(root.path().join("annotated"), b"").unwrap();

  std::fs::write(inbox.join("hit.png"), png_bytes(64, 64)).unwrap();
  write_tensor(
    &tensors.join("hit.f32"),
    &[
      32.0, 32.0, 20.0, 20.0, 0.9, //
      10.0, 10.0, 4.0, 4.0, 0.1,
    ],
  );

  let summary = WatchTask::default()
    .run_task(
      WatchDirectory::new(&inbox).once(true),
      &detector(&tensors),
      &router(root.path()),
    )
    .unwrap();

  assert_eq!(summary.failed, 1);
  assert_eq!(summary.processed, 0);
  assert!(root.path().join("failed").join("hit.png").exists());
  assert!(!root.path().join("out").join("hit.png").exists());
}

#[test]
fn max_files_stops_early() {
  let root = tempfile::tempdir().unwrap();
  let inbox = root.path().join("inbox");
  let tensors = root.path().join("tensors");
  std::fs::create_dir_all(&inbox).unwrap();
  std::fs::create_dir_all(&tensors).unwrap();
  for name in ["a", "b", "c"] {
    std::fs::write(inbox.join(format!("{name}.png")), png_bytes(32, 32)).unwrap();
    write_tensor(
      &tensors.join(format!("{name}.f32")),
      &[16.0, 16.0, 8.0, 8.0, 0.1, 8.0, 8.0, 4.0, 4.0, 0.2],
    );
  }

  let summary = WatchTask::default()
    .with_max_files(Some(2))
    .run_task(
      WatchDirectory::new(&inbox).once(true),
      &detector(&tensors),
      &router(root.path()),
    )
    .unwrap();

  assert_eq!(summary.processed, 2);
  assert!(inbox.join("c.png").exists());
}

#[test]
fn annotation_is_deterministic() {
  let frame = Frame::decode("frame.png", png_bytes(200, 150)).unwrap();
  let detections = vec![
    Detection {
      class_id: 0,
      class_name: "squirrel".to_string(),
      score: 0.87,
      bbox: songshu::geometry::NormalizedBox::new(0.1, 0.3, 0.4, 0.5),
    },
    Detection {
      class_id: 0,
      class_name: "squirrel".to_string(),
      score: 0.6,
      bbox: songshu::geometry::NormalizedBox::new(0.5, 0.0, 0.5, 0.2),
    },
  ];

  let annotator = Annotator::new().unwrap();
  let first = annotator.annotate(&frame, &detections).unwrap();
  let second = annotator.annotate(&frame, &detections).unwrap();
  assert_eq!(first.bytes, second.bytes);
  assert_eq!(first.detection_count, 2);
  assert_eq!(first.glyphs, DETECTION_GLYPH.repeat(2));

  let mut image = frame.image().clone();
  annotator.draw_detections(&mut image, &detections);
  let decoded = image::load_from_memory(&first.bytes).unwrap().to_rgb8();
  assert_eq!(decoded, image);
  // 原始图像不受影响
  assert_ne!(frame.image(), &image);
}

#[test]
fn router_outcome_reports_written_paths() {
  let root = tempfile::tempdir().unwrap();
  let input = root.path().join("cam.png");
  std::fs::write(&input, png_bytes(64, 64)).unwrap();
  let frame = Frame::decode(&input, std::fs::read(&input).unwrap()).unwrap();

  let outcome = router(root.path()).render_result(&frame, &[]).unwrap();
  assert_eq!(
    outcome,
    RouteOutcome::Empty {
      moved: root.path().join("empty").join("cam.png")
    }
  );
}

#[test]
fn jpeg_input_is_annotated_as_jpeg() {
  let frame = Frame::decode("frame.jpg", encoded(160, 120, ImageFormat::Jpeg)).unwrap();
  assert_eq!(frame.format(), ImageFormat::Jpeg);

  let detections = vec![Detection {
    class_id: 0,
    class_name: "squirrel".to_string(),
    score: 0.75,
    bbox: songshu::geometry::NormalizedBox::new(0.2, 0.3, 0.5, 0.5),
  }];
  let annotated = Annotator::new().unwrap().annotate(&frame, &detections).unwrap();

  assert_eq!(image::guess_format(&annotated.bytes).unwrap(), ImageFormat::Jpeg);
  let decoded = image::load_from_memory(&annotated.bytes).unwrap();
  assert_eq!((decoded.width(), decoded.height()), (160, 120));
}
