//! Check toolkit and accelerator availability.

use vidscale_gpu::{Upscaler, UpscalingFilter};
use vidscale_gst::launch::{missing_elements, video_encoder_element};
use vidscale_gst::GstToolkit;
use vidscale_media::{MediaToolkit, PixelBuffer, Size, VideoCodec};

pub fn run() -> anyhow::Result<()> {
    println!("Vidscale System Check");
    println!("{}", "=".repeat(50));

    let toolkit = GstToolkit::new();
    let toolkit_ok = match toolkit.check() {
        Ok(()) => {
            println!("[OK] Media toolkit: {}", toolkit.name());
            true
        }
        Err(e) => {
            println!("[FAIL] Media toolkit: {e}");
            false
        }
    };

    if toolkit_ok {
        for codec in [VideoCodec::Hevc, VideoCodec::H264, VideoCodec::ProRes422] {
            let element = video_encoder_element(codec);
            if missing_elements(&[element]).is_empty() {
                println!("[OK] Encoder for {codec}: {element}");
            } else {
                println!("[WARN] Encoder for {codec}: {element} not installed");
            }
        }
        for parser in ["aacparse", "ac3parse", "mpegaudioparse"] {
            if missing_elements(&[parser]).is_empty() {
                println!("[OK] Audio passthrough: {parser}");
            } else {
                println!("[WARN] Audio passthrough: {parser} not installed");
            }
        }
    }

    let accelerator = vidscale_gpu::default_accelerator();
    let probe_in = Size::new(16, 16);
    let probe_out = Size::new(32, 32);
    let engine_ok = match Upscaler::new(accelerator.as_ref(), probe_in, probe_out) {
        Ok(upscaler) => {
            let frame = PixelBuffer::solid_bgra(probe_in, [0, 0, 0, 255]);
            match upscaler.upscale_blocking(&frame, None, None) {
                Ok(_) => {
                    println!("[OK] Upscale engine: {}", accelerator.name());
                    true
                }
                Err(e) => {
                    println!("[FAIL] Upscale engine: {e}");
                    false
                }
            }
        }
        Err(e) => {
            println!("[FAIL] Upscale engine: {e}");
            false
        }
    };

    let mut filter = UpscalingFilter::new(accelerator).with_output_size(probe_out);
    if let Some(preview) = filter.apply(&PixelBuffer::solid_bgra(probe_in, [0, 0, 0, 255])) {
        tracing::debug!(size = %preview.size(), "Interactive filter probe");
    }

    println!();
    if toolkit_ok && engine_ok {
        println!("All required components are available. Vidscale is ready.");
    } else {
        println!("Some required components are missing. See above for fixes.");
    }

    Ok(())
}
