use super::*;
use crate::audio::testing::{wait_until, MockDeviceFactory};
use crate::models::PlaybackState;
use clap::Parser;
use std::io::Cursor;

fn parse(args: &[&str]) -> Commands {
    CliApp::try_parse_from(args).unwrap().command
}

#[test]
fn test_parse_play_with_stream_args() {
    let command = parse(&[
        "rawplay", "play", "audio.raw", "--format", "f32", "--channels", "1", "--rate", "48000",
        "--buffer-size", "min", "--chunk-bytes", "1024", "--volume", "50",
    ]);

    match command {
        Commands::Play { input, stream } => {
            assert_eq!(input, PathBuf::from("audio.raw"));
            assert_eq!(stream.format, Some(SampleFormat::Float32));
            assert_eq!(stream.channels, Some(1));
            assert_eq!(stream.rate, Some(48000));
            assert_eq!(stream.buffer_size, Some(BufferSize::DeviceMinimum));
            assert_eq!(stream.chunk_bytes, Some(1024));
            assert_eq!(stream.volume, Some(50));
            assert_eq!(stream.device, None);
        }
        other => panic!("Expected Play command, got {:?}", other),
    }
}

#[test]
fn test_parse_play_stdin() {
    match parse(&["rawplay", "play", "-"]) {
        Commands::Play { input, .. } => assert_eq!(input, PathBuf::from("-")),
        other => panic!("Expected Play command, got {:?}", other),
    }
}

#[test]
fn test_parse_tone_defaults() {
    match parse(&["rawplay", "tone"]) {
        Commands::Tone { frequency, seconds, stream } => {
            assert_eq!(frequency, 440.0);
            assert_eq!(seconds, 2.0);
            assert!(stream.format.is_none());
        }
        other => panic!("Expected Tone command, got {:?}", other),
    }
}

#[test]
fn test_parse_config_actions() {
    assert!(matches!(
        parse(&["rawplay", "config", "show"]),
        Commands::Config { action: ConfigAction::Show }
    ));
    assert!(matches!(
        parse(&["rawplay", "config", "volume", "75"]),
        Commands::Config { action: ConfigAction::Volume { level: 75 } }
    ));
    assert!(matches!(
        parse(&["rawplay", "config", "buffer", "8192"]),
        Commands::Config { action: ConfigAction::Buffer { size: BufferSize::Bytes(8192) } }
    ));
    assert!(matches!(parse(&["rawplay", "devices"]), Commands::Devices));
}

#[test]
fn test_parse_rejects_bad_values() {
    assert!(CliApp::try_parse_from(["rawplay", "play", "a.raw", "--volume", "150"]).is_err());
    assert!(CliApp::try_parse_from(["rawplay", "play", "a.raw", "--format", "mp3"]).is_err());
    assert!(CliApp::try_parse_from(["rawplay", "config", "buffer", "0"]).is_err());
    assert!(CliApp::try_parse_from(["rawplay"]).is_err());
}

#[test]
fn test_resolve_uses_config_defaults() {
    let config = PlayerConfig {
        preferred_device: Some("USB DAC".to_string()),
        ..PlayerConfig::default()
    };
    let plan = StreamArgs::default().resolve(&config).unwrap();

    assert_eq!(plan.options.format, config.stream_format());
    assert_eq!(plan.options.buffer_size, BufferSize::DeviceMinimum);
    assert_eq!(plan.device.as_deref(), Some("USB DAC"));
    assert_eq!(plan.volume, config.default_volume);
    assert_eq!(plan.chunk_bytes, config.chunk_bytes);
}

#[test]
fn test_resolve_arguments_override_config() {
    let args = StreamArgs {
        format: Some(SampleFormat::Float32),
        channels: Some(1),
        buffer_size: Some(BufferSize::Bytes(16384)),
        // Not a whole number of frames for mono float32
        chunk_bytes: Some(1002),
        volume: Some(25),
        device: Some("Speakers".to_string()),
        ..StreamArgs::default()
    };
    let plan = args.resolve(&PlayerConfig::default()).unwrap();

    assert_eq!(plan.options.format.sample_format, SampleFormat::Float32);
    assert_eq!(plan.options.format.channels, 1);
    assert_eq!(plan.options.buffer_size, BufferSize::Bytes(16384));
    assert_eq!(plan.chunk_bytes, 1000);
    assert_eq!(plan.volume, 0.25);
    assert_eq!(plan.device.as_deref(), Some("Speakers"));
}

#[test]
fn test_resolve_rejects_invalid_stream() {
    let args = StreamArgs {
        channels: Some(4),
        ..StreamArgs::default()
    };
    assert!(args.resolve(&PlayerConfig::default()).is_err());

    let args = StreamArgs {
        chunk_bytes: Some(0),
        ..StreamArgs::default()
    };
    assert!(args.resolve(&PlayerConfig::default()).is_err());
}

#[test]
fn test_sine_tone_layout() {
    let format = StreamFormat::new(SampleFormat::Int16, 2, 8000);
    let tone = sine_tone(format, 1000.0, 0.5, 1.0);

    assert_eq!(tone.len(), 4000 * 4);
    // First sample is sin(0), identical on both channels
    assert_eq!(&tone[..4], &[0, 0, 0, 0]);
    // A quarter period in (2 frames at 1 kHz / 8 kHz) the sine peaks
    let left = i16::from_le_bytes([tone[8], tone[9]]);
    let right = i16::from_le_bytes([tone[10], tone[11]]);
    assert_eq!(left, right);
    assert!(left > 32000);
}

#[test]
fn test_sine_tone_formats() {
    let mono8 = StreamFormat::new(SampleFormat::Int8, 1, 1000);
    assert_eq!(sine_tone(mono8, 100.0, 1.0, 0.5).len(), 1000);

    let stereo_f32 = StreamFormat::new(SampleFormat::Float32, 2, 1000);
    let tone = sine_tone(stereo_f32, 100.0, 0.1, 0.5);
    assert_eq!(tone.len(), 100 * 8);
    let peak = tone
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]).abs())
        .fold(0.0f32, f32::max);
    assert!(peak <= 0.5 + f32::EPSILON);
}

#[test]
fn test_playback_duration_and_format() {
    let format = StreamFormat::new(SampleFormat::Int16, 2, 44100);
    assert_eq!(playback_duration(format, 44100 * 4 * 3), Duration::from_secs(3));
    assert_eq!(format_duration(Duration::from_secs(125)), "02:05");
}

#[test]
fn test_volume_from_percent() {
    assert_eq!(volume_from_percent(0), 0.0);
    assert_eq!(volume_from_percent(50), 0.5);
    assert_eq!(volume_from_percent(100), 1.0);
}

#[test]
fn test_describe_device() {
    let info = DeviceInfo {
        name: "Speakers".to_string(),
        is_default: true,
        max_channels: 2,
        min_sample_rate: 44100,
        max_sample_rate: 48000,
        sample_formats: vec!["i16".to_string(), "f32".to_string()],
    };
    let line = describe_device(&info);
    assert!(line.starts_with("* Speakers"));
    assert!(line.contains("44100-48000 Hz"));
    assert!(line.contains("i16/f32"));
}

#[test]
fn test_open_input_missing_file() {
    let err = open_input(Path::new("/definitely/not/here.raw")).err().unwrap();
    assert!(matches!(err, PlayerError::File(_)));
}

#[test]
fn test_feed_from_reader_chunks_in_order() {
    let factory = MockDeviceFactory::new(4096);
    let player = RawSoundPlayer::initialize(&factory, PlayerOptions::default(), None).unwrap();
    player.play().unwrap();

    let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let cancelled = AtomicBool::new(false);
    let fed = feed_from_reader(&player, Cursor::new(data.clone()), 4096, MAX_QUEUED_CHUNKS, &cancelled).unwrap();
    assert_eq!(fed, 3);

    let monitor = factory.last_monitor();
    assert!(wait_until(Duration::from_secs(5), || monitor.written_bytes().len() == data.len()));
    assert_eq!(monitor.written_bytes(), data);
    assert_eq!(player.state().unwrap(), PlaybackState::Playing);
}

#[test]
fn test_feed_from_reader_honours_cancel() {
    let factory = MockDeviceFactory::new(4096);
    let player = RawSoundPlayer::initialize(&factory, PlayerOptions::default(), None).unwrap();

    let cancelled = AtomicBool::new(true);
    let fed = feed_from_reader(&player, Cursor::new(vec![1u8; 100]), 4, MAX_QUEUED_CHUNKS, &cancelled).unwrap();
    assert_eq!(fed, 0);
    assert_eq!(player.queued_frames(), 0);
}
