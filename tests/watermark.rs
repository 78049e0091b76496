//! Cached-frame source integration tests against the in-memory catalog.

mod common;

use common::{MockCatalog, ScriptedMedia, ScriptedPacket, is_filled};
use stillframe::{
    CachedFrameSource, Command, ErrorKind, StillFrameError, WatermarkOptions, parse_frame_rate,
};

fn catalog_with_logo() -> MockCatalog {
    let catalog = MockCatalog::new();
    catalog.add_media("logo.png", ScriptedMedia::image(32, 16, 200));
    catalog.add_media("other.png", ScriptedMedia::image(10, 20, 50));
    catalog
}

#[test]
fn produces_cached_frame_with_increasing_timestamps() {
    let catalog = catalog_with_logo();
    let mut source = CachedFrameSource::open(catalog.clone(), WatermarkOptions::new("logo.png"))
        .expect("open watermark");

    for expected in 0..5 {
        let frame = source.produce_next().expect("frame");
        assert_eq!(frame.pts(), Some(expected));
        assert_eq!((frame.width(), frame.height()), (32, 16));
        assert!(is_filled(&frame, 200));
    }
    assert_eq!(source.next_pts(), 5);
    assert_eq!(catalog.ledger.borrow().decoders_opened, 1);
}

#[test]
fn negotiates_synthetic_rate() {
    let options = WatermarkOptions::new("logo.png").rate(parse_frame_rate("10/1").unwrap());
    let mut source = CachedFrameSource::open(catalog_with_logo(), options).unwrap();

    let parameters = source.negotiate_output().unwrap();
    assert_eq!((parameters.width, parameters.height), (32, 16));
    assert_eq!(
        (parameters.frame_rate.numerator(), parameters.frame_rate.denominator()),
        (10, 1)
    );
    assert_eq!(
        (parameters.time_base.numerator(), parameters.time_base.denominator()),
        (1, 10)
    );

    let timestamps: Vec<_> = (0..3)
        .map(|_| source.produce_next().and_then(|frame| frame.pts()))
        .collect();
    assert_eq!(timestamps, vec![Some(0), Some(1), Some(2)]);
}

#[test]
fn default_rate_is_25() {
    let source = CachedFrameSource::open(catalog_with_logo(), WatermarkOptions::new("logo.png"))
        .unwrap();
    let parameters = source.negotiate_output().unwrap();
    assert_eq!(parameters.frame_rate.numerator(), 25);
    assert_eq!(parameters.time_base.denominator(), 25);
}

#[test]
fn missing_filename_is_config_error() {
    let result = CachedFrameSource::open(MockCatalog::new(), WatermarkOptions::default());
    assert_eq!(result.unwrap_err().kind(), ErrorKind::Config);

    let mut source = CachedFrameSource::new(MockCatalog::new(), WatermarkOptions::default());
    assert_eq!(source.initialize("").unwrap_err().kind(), ErrorKind::Config);
    assert!(source.produce_next().is_none());
}

#[test]
fn inert_source_is_not_ready() {
    let catalog = MockCatalog::new();
    let mut source = CachedFrameSource::new(catalog, WatermarkOptions::new("missing.png"));

    let error = source.initialize("missing.png").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Open);
    assert!(!source.is_ready());
    assert!(matches!(source.negotiate_output(), Err(StillFrameError::NotReady)));
    for _ in 0..3 {
        assert!(source.produce_next().is_none());
    }
}

#[test]
fn file_without_video_stream_fails_to_open() {
    let catalog = MockCatalog::new();
    let mut media = ScriptedMedia::image(4, 4, 0);
    media.video_stream = None;
    catalog.add_media("audio.wav", media);

    let mut source = CachedFrameSource::new(catalog.clone(), WatermarkOptions::default());
    let error = source.initialize("audio.wav").unwrap_err();
    assert!(matches!(error, StillFrameError::NoVideoStream { .. }));
    assert!(source.produce_next().is_none());
    assert_eq!(catalog.decoders_outstanding(), 0);
}

#[test]
fn file_without_decodable_frame_releases_decoder() {
    let catalog = MockCatalog::new();
    let mut media = ScriptedMedia::image(4, 4, 0);
    media.packets = vec![
        ScriptedPacket {
            stream: 1,
            decodable: true,
        },
        ScriptedPacket {
            stream: 0,
            decodable: false,
        },
    ];
    catalog.add_media("broken.png", media);

    let mut source = CachedFrameSource::new(catalog.clone(), WatermarkOptions::default());
    let error = source.initialize("broken.png").unwrap_err();

    assert!(matches!(error, StillFrameError::NoVideoFrame { .. }));
    assert_eq!(error.kind(), ErrorKind::Open);
    assert!(source.produce_next().is_none());
    assert_eq!(catalog.decoders_outstanding(), 0);
}

#[test]
fn skips_foreign_and_corrupt_packets_before_first_frame() {
    let catalog = MockCatalog::new();
    let mut media = ScriptedMedia::image(6, 6, 77);
    media.video_stream = Some(1);
    media.packets = vec![
        ScriptedPacket {
            stream: 0,
            decodable: true,
        },
        ScriptedPacket {
            stream: 1,
            decodable: false,
        },
        ScriptedPacket {
            stream: 1,
            decodable: true,
        },
    ];
    catalog.add_media("muxed.mkv", media);

    let mut source = CachedFrameSource::new(catalog, WatermarkOptions::default());
    source.initialize("muxed.mkv").expect("third packet decodes");

    let frame = source.produce_next().unwrap();
    assert!(is_filled(&frame, 77));
}

#[test]
fn buffering_decoder_is_drained_at_end_of_input() {
    let catalog = MockCatalog::new();
    let mut media = ScriptedMedia::image(4, 2, 11);
    media.buffered = true;
    catalog.add_media("delayed.mp4", media);

    let mut source = CachedFrameSource::new(catalog, WatermarkOptions::default());
    source.initialize("delayed.mp4").expect("frame released on drain");
    assert!(source.is_ready());
}

#[test]
fn demux_failure_is_open_error() {
    let catalog = MockCatalog::new();
    let mut media = ScriptedMedia::image(4, 2, 11);
    media.read_error_after = Some(0);
    catalog.add_media("truncated.png", media);

    let mut source = CachedFrameSource::new(catalog.clone(), WatermarkOptions::default());
    let error = source.initialize("truncated.png").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Open);
    assert_eq!(catalog.decoders_outstanding(), 0);
}

#[test]
fn swap_resets_timestamps_and_serves_new_frame() {
    let catalog = catalog_with_logo();
    let mut source =
        CachedFrameSource::open(catalog.clone(), WatermarkOptions::new("logo.png")).unwrap();
    for _ in 0..4 {
        source.produce_next();
    }

    source
        .process_command(Command::Filename("other.png".to_string()))
        .expect("swap");

    let frame = source.produce_next().unwrap();
    assert_eq!(frame.pts(), Some(0));
    assert_eq!((frame.width(), frame.height()), (10, 20));
    assert!(is_filled(&frame, 50));
    assert_eq!(source.file_path().unwrap().to_str(), Some("other.png"));

    let parameters = source.negotiate_output().unwrap();
    assert_eq!((parameters.width, parameters.height), (10, 20));

    // The old decoder was released before the new one was opened.
    assert_eq!(catalog.ledger.borrow().decoders_opened, 2);
    assert_eq!(catalog.decoders_outstanding(), 1);
}

#[test]
fn failed_swap_leaves_source_inert() {
    let catalog = catalog_with_logo();
    let mut source =
        CachedFrameSource::open(catalog.clone(), WatermarkOptions::new("logo.png")).unwrap();
    source.produce_next();

    let error = source.swap_file("does_not_exist.png").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Open);
    assert!(source.produce_next().is_none(), "stale frame must not be served");
    assert!(source.negotiate_output().is_err());
    assert_eq!(catalog.decoders_outstanding(), 0);

    // A later good swap recovers.
    source.swap_file("logo.png").unwrap();
    assert_eq!(source.produce_next().unwrap().pts(), Some(0));
}

#[test]
fn dropping_source_releases_decoder() {
    let catalog = catalog_with_logo();
    let source = CachedFrameSource::open(catalog.clone(), WatermarkOptions::new("logo.png")).unwrap();
    assert_eq!(catalog.decoders_outstanding(), 1);
    drop(source);
    assert_eq!(catalog.decoders_outstanding(), 0);
}
