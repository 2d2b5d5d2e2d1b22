mod common;

use common::*;
use ndarray::Array2;
use tundraburn::core::burn_metrics::BurnMetric;
use tundraburn::core::land_mask::LandMask;
use tundraburn::core::vectorize::TileGrid;
use tundraburn::core::SequentialBackend;
use tundraburn::io::export::MemorySink;
use tundraburn::types::is_nodata;
use tundraburn::{
    ExportSink, FirePipeline, GeoJsonFolderSink, MemoryArchive, RasterGrid, RoiMode, RunConfig,
};

const YEAR: i32 = 2015;

/// 4 x 6 grid; a 2 x 2 block at rows 1-2, cols 1-2 and pixel (1, 4) burn in 2015
fn burned(r: usize, c: usize) -> bool {
    ((1..3).contains(&r) && (1..3).contains(&c)) || (r, c) == (1, 4)
}

fn archive(g: &RasterGrid) -> MemoryArchive {
    let mut archive = MemoryArchive::new();
    for year in YEAR - 3..YEAR {
        archive.insert(landsat8_scene(g, date(year, 7, 10), |_, _| VEGETATED));
    }
    for year in [YEAR, YEAR + 1] {
        archive.insert(landsat8_scene(g, date(year, 7, 10), |r, c| {
            if burned(r, c) {
                BURNED
            } else {
                VEGETATED
            }
        }));
    }
    // Outside every season window
    archive.insert(landsat8_scene(g, date(YEAR, 10, 1), |_, _| BURNED));
    archive
}

/// Pixel (1, 4) is permanent water
fn land(g: &RasterGrid) -> LandMask {
    let mut valid = Array2::from_elem(g.shape(), true);
    valid[[1, 4]] = false;
    LandMask::new(valid)
}

fn config(tiles: TileGrid) -> RunConfig {
    let mut config = RunConfig::new(YEAR, RoiMode::DefaultRegion);
    config.tile_grid = tiles;
    config
}

#[test]
fn test_burned_block_becomes_one_polygon() {
    init_logging();
    let g = grid(4, 6);
    let pipeline = FirePipeline::with_backend(
        config(TileGrid::new(1, 1)),
        g,
        dnbr2_classifier(200.0),
        land(&g),
        SequentialBackend,
    )
    .unwrap();

    let output = pipeline.run(&archive(&g), None).unwrap();

    let dnbr2 = output.metrics.band(BurnMetric::Dnbr2);
    assert!(dnbr2[[1, 1]] > 300.0);
    assert_eq!(dnbr2[[0, 0]], 0.0);
    assert!(is_nodata(dnbr2[[1, 4]]));

    assert_eq!(output.probability[[1, 1]], 0.95);
    assert_eq!(output.probability[[0, 0]], 0.05);
    assert!(is_nodata(output.probability[[1, 4]]));

    let expected = Array2::from_shape_fn(g.shape(), |(r, c)| burned(r, c) && (r, c) != (1, 4));
    assert_eq!(output.candidates, expected);

    assert_eq!(output.polygons.len(), 1);
    assert_eq!(output.polygons[0].count, 4);
    assert_eq!(output.polygons[0].area_m2, 4.0 * 3600.0);
    assert!(output.exports.is_empty());
}

#[test]
fn test_tiled_export_names_every_tile() {
    let g = grid(4, 6);
    let mut config = config(TileGrid::default());
    config.export_enabled = true;
    let pipeline =
        FirePipeline::new(config, g, dnbr2_classifier(200.0), land(&g)).unwrap();
    let sink = MemorySink::new();

    let output = pipeline.run(&archive(&g), Some(&sink)).unwrap();

    // The block straddles two tiles
    assert_eq!(output.polygons.len(), 2);
    assert_eq!(output.polygons.iter().map(|p| p.count).sum::<usize>(), 4);

    let datasets = sink.datasets().unwrap();
    assert_eq!(datasets.len(), 16);
    assert_eq!(output.exports.len(), 16);
    assert!(output
        .exports
        .contains(&"candidateFires__2015__default-t05_1px60m".to_string()));
    let with_features: usize = datasets.iter().filter(|d| !d.features.is_empty()).count();
    assert_eq!(with_features, 2);
}

#[test]
fn test_drawn_roi_limits_candidates() {
    let g = grid(4, 6);
    // Covers columns 0 and 1 only
    let roi = roi(500_000.0, 7_599_760.0, 500_120.0, 7_600_000.0);
    let mut config = RunConfig::new(
        YEAR,
        RoiMode::Drawn {
            id: "west".into(),
            bounds: roi,
        },
    );
    config.tile_grid = TileGrid::new(1, 1);
    config.export_enabled = true;
    let pipeline =
        FirePipeline::new(config, g, dnbr2_classifier(200.0), land(&g)).unwrap();
    let sink = MemorySink::new();

    let output = pipeline.run(&archive(&g), Some(&sink)).unwrap();
    assert_eq!(output.candidates.iter().filter(|v| **v).count(), 2);
    assert_eq!(output.polygons.len(), 1);
    assert_eq!(output.polygons[0].count, 2);
    assert_eq!(output.exports, vec!["candidateFires__2015__west-t00_1px60m"]);
}

#[test]
fn test_export_disabled_skips_sink() {
    let g = grid(4, 6);
    let pipeline =
        FirePipeline::new(config(TileGrid::default()), g, dnbr2_classifier(200.0), land(&g))
            .unwrap();
    let sink = MemorySink::new();
    let output = pipeline.run(&archive(&g), Some(&sink)).unwrap();
    assert!(output.exports.is_empty());
    assert!(sink.datasets().unwrap().is_empty());
}

#[test]
fn test_empty_archive_yields_no_candidates() {
    let g = grid(4, 6);
    let pipeline =
        FirePipeline::new(config(TileGrid::default()), g, dnbr2_classifier(200.0), land(&g))
            .unwrap();
    let output = pipeline.run(&MemoryArchive::new(), None).unwrap();
    assert!(output.probability.iter().all(|p| is_nodata(*p)));
    assert!(output.candidates.iter().all(|c| !*c));
    assert!(output.polygons.is_empty());
}

#[test]
fn test_geojson_folder_refuses_second_run() {
    let g = grid(4, 6);
    let mut config = config(TileGrid::new(1, 1));
    config.export_enabled = true;
    let pipeline =
        FirePipeline::new(config, g, dnbr2_classifier(200.0), land(&g)).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let sink = GeoJsonFolderSink::new(dir.path()).unwrap();

    let output = pipeline
        .run(&archive(&g), Some(&sink as &dyn ExportSink))
        .unwrap();
    let path = sink.path_for(&output.exports[0]);
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["features"][0]["properties"]["count"], 4);

    assert!(pipeline.run(&archive(&g), Some(&sink)).is_err());
}

#[test]
fn test_rejects_mismatched_land_mask() {
    let g = grid(4, 6);
    let result = FirePipeline::new(
        config(TileGrid::default()),
        g,
        dnbr2_classifier(200.0),
        LandMask::all_land((3, 3)),
    );
    assert!(result.is_err());
}
