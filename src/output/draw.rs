// 该文件是 Lookout （瞭望） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::Rgb;

use crate::{
  model::{BBox, DetectResult},
  output::Surface,
};

// 叠加层绘制常量
const LABEL_PADDING: f32 = 4.0;
const BOX_LINE_WIDTH: f32 = 2.0;
const BOX_COLOR: [u8; 3] = [2, 132, 199]; // 蓝色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
  pub box_color: Rgb<u8>,
  pub text_color: Rgb<u8>,
  pub line_width: f32,
  pub label_padding: f32,
}

impl Default for OverlayStyle {
  fn default() -> Self {
    Self {
      box_color: Rgb(BOX_COLOR),
      text_color: Rgb(TEXT_COLOR),
      line_width: BOX_LINE_WIDTH,
      label_padding: LABEL_PADDING,
    }
  }
}

/// 标签背景框：底边贴着检测框上沿，放不下时贴住画面顶部
pub fn label_box(bbox: &BBox, text_width: f32, text_height: f32, style: &OverlayStyle) -> BBox {
  let width = text_width + 2.0 * style.label_padding;
  let height = text_height + 2.0 * style.label_padding;
  let x_min = bbox.x_min.max(0.0);
  let y_min = (bbox.y_min - height).max(0.0);

  BBox::new(x_min, y_min, x_min + width, y_min + height)
}

/// 清空表面后按检测器给出的顺序绘制每个检测框和标签
pub fn draw_detections<S: Surface + ?Sized>(
  surface: &S,
  result: &DetectResult,
  style: &OverlayStyle,
) {
  surface.clear();

  for item in result.iter() {
    surface.stroke_rect(&item.bbox, style.box_color, style.line_width);

    let caption = item.caption();
    let (text_width, text_height) = surface.text_size(&caption);
    let background = label_box(&item.bbox, text_width, text_height, style);
    surface.fill_rect(&background, style.box_color);
    surface.fill_text(
      &caption,
      background.x_min + style.label_padding,
      background.y_min + style.label_padding,
      style.text_color,
    );
  }
}
