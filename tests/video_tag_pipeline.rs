//! VideoData tag 解析集成测试: 模拟一段 RTMP 推流中的视频消息序列.

use avcscope::codec::parsers::h264::{AvcDecoderConfigRecord, NalUnitType, split_avcc};
use avcscope::core::BitWriter;
use avcscope::format::{AvcPacketType, CodecId, FrameType};
use avcscope::{AvcError, ParserConfig, UnsupportedSyntaxPolicy, VideoTagParser, parse_video_tag};
use bytes::Bytes;

/// x264 High Profile PPS (CABAC, transform_8x8_mode_flag=1)
const PPS: [u8; 6] = [0x68, 0xEB, 0xE3, 0xCB, 0x22, 0xC0];
const AUD: [u8; 2] = [0x09, 0xF0];
const SEI: [u8; 4] = [0x06, 0x05, 0x01, 0x80];
const IDR: [u8; 6] = [0x65, 0x88, 0x84, 0x00, 0x33, 0xFF];
const P_SLICE: [u8; 4] = [0x41, 0x9A, 0x02, 0x04];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn avcc(nalus: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for n in nalus {
        out.extend_from_slice(&(n.len() as u32).to_be_bytes());
        out.extend_from_slice(n);
    }
    out
}

/// High Profile 1280x720 SPS, 30000/1001 fps, 带 scaling matrix 可选
fn sps_720p(scaling_matrix: bool) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0x67, 8);
    bw.write_bits(100, 8);
    bw.write_bits(0x00, 8);
    bw.write_bits(31, 8);
    bw.write_ue(0);
    bw.write_ue(1); // chroma_format_idc
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(false);
    bw.write_flag(scaling_matrix);
    if scaling_matrix {
        for i in 0..8 {
            bw.write_flag(i == 0);
            if i == 0 {
                bw.write_se(-8);
            }
        }
    }
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_ue(2);
    bw.write_ue(3);
    bw.write_flag(false);
    bw.write_ue(79);
    bw.write_ue(44);
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_flag(false);
    bw.write_flag(true); // vui_parameters_present_flag
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(true); // timing_info_present_flag
    bw.write_bits(1001, 32);
    bw.write_bits(60000, 32);
    bw.write_flag(false);
    bw.write_trailing_bits();
    bw.finish()
}

fn avc_tag(frame_type: u8, packet_type: u8, cts: i32, body: &[u8]) -> Vec<u8> {
    let cts = (cts as u32) & 0x00FF_FFFF;
    let mut tag = vec![
        (frame_type << 4) | 7,
        packet_type,
        (cts >> 16) as u8,
        (cts >> 8) as u8,
        cts as u8,
    ];
    tag.extend_from_slice(body);
    tag
}

fn sequence_header_tag(sps: Vec<u8>) -> Vec<u8> {
    let record = AvcDecoderConfigRecord {
        configuration_version: 1,
        profile_indication: 100,
        profile_compatibility: 0,
        level_indication: 31,
        length_size_minus_one: 3,
        sps_list: vec![Bytes::from(sps)],
        pps_list: vec![Bytes::from_static(&PPS)],
    };
    avc_tag(1, 0, 0, &record.to_bytes().expect("序列化 avcC 失败"))
}

#[test]
fn test_rtmp_video_message_sequence() {
    init_logger();
    let parser = VideoTagParser::new();

    // 1. sequence header
    let header = parser
        .parse(sequence_header_tag(sps_720p(false)))
        .expect("解析 sequence header 失败");
    assert_eq!(header.avc_packet_type, Some(AvcPacketType::SequenceHeader));
    let seq = header.sequence_header.as_ref().expect("sequence header 缺失");
    assert_eq!(seq.record.nalu_length_size(), 4);
    let sps = seq.first_sps().expect("SPS 解析失败");
    assert_eq!((sps.cropped_width, sps.cropped_height), (1280, 720));
    let fps = sps.frame_rate.expect("帧率缺失");
    assert!((fps - 29.97).abs() < 0.01, "fps={}", fps);
    let pps = seq.pps[0].as_ref().expect("PPS 解析失败");
    assert!(pps.transform_8x8_mode());

    // 2. 关键帧
    let key = parser
        .parse(avc_tag(1, 1, 0, &avcc(&[&AUD, &SEI, &IDR])))
        .expect("解析关键帧失败");
    assert!(key.frame_type.is_keyframe());
    let types: Vec<_> = key.nalus.iter().map(|n| n.nal_type).collect();
    assert_eq!(
        types,
        vec![NalUnitType::Aud, NalUnitType::Sei, NalUnitType::SliceIdr]
    );
    assert_eq!(key.nalus[2].ref_idc, 3);

    // 3. 带 B 帧重排的 P 帧
    let inter = parser
        .parse(avc_tag(2, 1, 80, &avcc(&[&P_SLICE])))
        .expect("解析 P 帧失败");
    assert_eq!(inter.frame_type, FrameType::Interframe);
    assert_eq!(inter.composition_time, Some(80));
    assert_eq!(inter.nalus[0].nal_type, NalUnitType::Slice);

    // 4. end of sequence
    let eos = parser.parse(avc_tag(1, 2, 0, &[])).expect("解析 EOS 失败");
    assert_eq!(eos.avc_packet_type, Some(AvcPacketType::EndOfSequence));
    assert!(eos.nalus.is_empty());
}

#[test]
fn test_nalu_tag_matches_direct_demux() {
    let body = avcc(&[&AUD, &IDR]);
    let mut tag = vec![0x17u8, 0x01, 0x00, 0x00, 0x00];
    tag.extend_from_slice(&body);
    let result = parse_video_tag(tag).expect("解析 tag 失败");
    assert_eq!(result.frame_type, FrameType::Keyframe);
    assert_eq!(result.codec_id, CodecId::Avc);
    assert_eq!(result.avc_packet_type, Some(AvcPacketType::Nalu));
    assert_eq!(result.composition_time, Some(0));
    assert_eq!(result.nalus, split_avcc(&Bytes::from(body)).nalus);
}

#[test]
fn test_truncated_nalu_tag_keeps_complete_units() {
    let mut body = avcc(&[&IDR]);
    body.extend_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x41]);
    let result = parse_video_tag(avc_tag(1, 1, 0, &body)).expect("截断不应导致失败");
    assert_eq!(result.nalus.len(), 1);
    let truncation = result.truncation.expect("应报告尾部截断");
    assert_eq!(truncation.declared_len, Some(256));
    assert_eq!(truncation.remaining, 5);
}

#[test]
fn test_invalid_tags() {
    assert!(matches!(
        parse_video_tag(Vec::<u8>::new()),
        Err(AvcError::InvalidTag(_))
    ));
    assert!(matches!(
        parse_video_tag(vec![0x17u8, 0x01]),
        Err(AvcError::InvalidTag(_))
    ));
    assert!(matches!(
        parse_video_tag(avc_tag(1, 0, 0, &[0x01, 0x64, 0x00])),
        Err(AvcError::MalformedRecord { .. })
    ));
}

#[test]
fn test_negative_composition_time() {
    let result = parse_video_tag(avc_tag(2, 1, -40, &[])).expect("解析失败");
    assert_eq!(result.composition_time, Some(-40));
}

#[test]
fn test_hevc_tag_left_opaque() {
    let result = parse_video_tag(vec![0x1Cu8, 0x01, 0x00, 0x00, 0x00, 0xAB]).expect("解析失败");
    assert_eq!(result.codec_id, CodecId::Hevc);
    assert_eq!(result.codec_id.to_string(), "HEVC");
    assert!(result.avc_packet_type.is_none());
    assert!(result.nalus.is_empty());
    assert_eq!(result.payload.map(|p| p.len()), Some(5));
}

#[test]
fn test_config_from_json_drives_parser() {
    init_logger();
    let config: ParserConfig = serde_json::from_str(r#"{"unsupported_syntax": "skip"}"#)
        .expect("反序列化配置失败");
    assert_eq!(config.unsupported_syntax, UnsupportedSyntaxPolicy::Skip);

    let tag = sequence_header_tag(sps_720p(true));

    let strict = parse_video_tag(tag.clone()).expect("sequence header 本身应解析成功");
    let seq = strict.sequence_header.expect("sequence header 缺失");
    assert!(matches!(
        seq.sps[0],
        Err(AvcError::UnsupportedFeature {
            feature: "seq_scaling_matrix",
            ..
        })
    ));

    let lenient = VideoTagParser::with_config(config)
        .expect("创建解析器失败")
        .parse(tag)
        .expect("解析失败");
    let sps = lenient
        .sequence_header
        .as_ref()
        .and_then(|s| s.first_sps())
        .expect("Skip 策略下 SPS 应解析成功");
    assert_eq!((sps.width, sps.height), (1280, 720));
}

#[test]
fn test_result_json_report() {
    let result = parse_video_tag(avc_tag(1, 1, 33, &avcc(&[&sps_720p(false), &IDR])))
        .expect("解析失败");
    let json = serde_json::to_value(&result).expect("序列化失败");
    assert_eq!(json["frame_type"], "Keyframe");
    assert_eq!(json["avc_packet_type"], "NALU");
    assert_eq!(json["composition_time"], 33);
    assert_eq!(json["nalus"][0]["nal_type"], "SPS");
    assert_eq!(json["nalus"][0]["decoded"]["kind"], "Sps");
    assert_eq!(json["nalus"][0]["decoded"]["value"]["cropped_width"], 1280);
    assert_eq!(json["nalus"][1]["nal_type"], "IDR-slice");
    assert!(json["truncation"].is_null());
}

#[test]
fn test_parser_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<VideoTagParser>();

    let parser = &VideoTagParser::new();
    let tags: Vec<Vec<u8>> = (0..8)
        .map(|i| avc_tag(2, 1, i * 40, &avcc(&[&P_SLICE])))
        .collect();
    std::thread::scope(|s| {
        let handles: Vec<_> = tags
            .iter()
            .map(|tag| s.spawn(move || parser.parse(tag.clone())))
            .collect();
        for (i, h) in handles.into_iter().enumerate() {
            let result = h.join().expect("线程崩溃").expect("解析失败");
            assert_eq!(result.composition_time, Some(i as i32 * 40));
        }
    });
}
