use proptest::prelude::*;
use vidscale_export::policy::{resolve_codec, resolve_output_size};
use vidscale_export::{CodecSelector, FormatLimits};
use vidscale_media::{Size, VideoCodec};

fn selector() -> impl Strategy<Value = CodecSelector> {
    prop_oneof![
        Just(CodecSelector::Source),
        Just(CodecSelector::Hevc),
        Just(CodecSelector::ProRes),
        Just(CodecSelector::H264),
    ]
}

fn source_codec() -> impl Strategy<Value = Option<VideoCodec>> {
    prop_oneof![
        Just(None),
        (0..VideoCodec::ALL.len()).prop_map(|i| Some(VideoCodec::ALL[i])),
    ]
}

#[test]
fn full_hd_doubles_to_4k_without_forcing_prores() {
    let limits = FormatLimits::default();
    let size = resolve_output_size(Size::new(1920, 1080), None, None, 2, &limits)
        .expect("4K output is within limits");
    assert_eq!(size, Size::new(3840, 2160));
    assert_eq!(
        resolve_codec(CodecSelector::Source, Some(VideoCodec::H264), size, &limits),
        VideoCodec::H264
    );
}

proptest! {
    #[test]
    fn height_only_keeps_aspect_ratio(w in 1u32..4000, h in 1u32..4000, out_h in 1u32..4000) {
        let limits = FormatLimits::default();
        let expected = (w as f64 * out_h as f64 / h as f64).round() as u32;
        match resolve_output_size(Size::new(w, h), None, Some(out_h), 2, &limits) {
            Ok(size) => {
                prop_assert_eq!(size, Size::new(expected, out_h));
            }
            Err(_) => prop_assert!(expected == 0 || expected > limits.max_dimension),
        }
    }

    #[test]
    fn default_is_twice_the_source(w in 1u32..8192, h in 1u32..8192) {
        let limits = FormatLimits::default();
        let size = resolve_output_size(Size::new(w, h), None, None, 2, &limits)
            .expect("twice a source below 8192 stays within limits");
        prop_assert_eq!(size, Size::new(w * 2, h * 2));
    }

    #[test]
    fn above_4k_area_never_uses_a_non_prores_codec(
        w in 1u32..16384, h in 1u32..16384, selector in selector(), source in source_codec()
    ) {
        let limits = FormatLimits::default();
        let size = Size::new(w, h);
        let codec = resolve_codec(selector, source, size, &limits);
        if size.area() > limits.max_non_prores_area {
            prop_assert!(codec.is_prores());
        }
        if size.area() > limits.prores_only_area {
            prop_assert_eq!(codec, VideoCodec::ProRes422);
        }
    }

    #[test]
    fn small_outputs_keep_the_requested_codec(
        w in 1u32..3840, h in 1u32..2160, source in source_codec()
    ) {
        let limits = FormatLimits::default();
        let codec = resolve_codec(CodecSelector::Source, source, Size::new(w, h), &limits);
        prop_assert_eq!(codec, source.unwrap_or(VideoCodec::Hevc));
    }
}
