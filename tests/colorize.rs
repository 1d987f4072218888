use farmnav::{
    colorize, decode_raster,
    error::DecodeError,
    palette::{color_for, Palette},
    PaletteName, RasterImage,
};

fn gradient(width: u32, height: u32) -> RasterImage {
    RasterImage::from_fn(width, height, |col, row| ((col + row * width) % 256) as u8).unwrap()
}

#[test]
fn every_intensity_maps_through_the_table() {
    let raster = RasterImage::from_fn(256, 1, |col, _| col as u8).unwrap();
    for palette in PaletteName::ALL {
        let image = colorize(&raster, palette);
        let table = Palette::get(palette);
        for (intensity, pixel) in image.pixels().iter().enumerate() {
            let expected = table.color(intensity as u8);
            assert_eq!(*pixel, [expected.r, expected.g, expected.b, 255]);
            assert_eq!(color_for(palette, intensity as u8), expected);
        }
    }
}

#[test]
fn png_raster_survives_decode_and_colorize() {
    let raster = gradient(37, 11);
    let decoded = decode_raster(&raster.to_png().unwrap()).unwrap();
    assert_eq!(decoded, raster);

    let image = colorize(&decoded, PaletteName::Magma);
    assert_eq!((image.width(), image.height()), (37, 11));
    assert_eq!(image.to_rgba_bytes().len(), 37 * 11 * 4);
}

#[test]
fn colour_png_is_reduced_to_luma() {
    let rgb = image::RgbImage::from_pixel(4, 2, image::Rgb([90, 90, 90]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    rgb.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    let raster = decode_raster(bytes.get_ref()).unwrap();
    assert_eq!((raster.width(), raster.height()), (4, 2));
    assert!(raster.channel().iter().all(|&v| v == 90));
}

#[test]
fn empty_and_garbage_payloads_are_rejected() {
    assert!(matches!(decode_raster(&[]), Err(DecodeError::Codec(_))));
    assert!(matches!(decode_raster(b"GIF89a-nope"), Err(DecodeError::Codec(_))));
    assert!(matches!(
        RasterImage::new(0, 5, Vec::new()),
        Err(DecodeError::EmptyRaster { .. })
    ));
    assert!(matches!(
        RasterImage::new(2, 2, vec![0; 3]),
        Err(DecodeError::SampleCount {
            expected: 4,
            actual: 3
        })
    ));
}

#[test]
fn unknown_palette_names_fall_back_to_viridis() {
    assert_eq!(PaletteName::from_name("plasma"), PaletteName::Viridis);
    assert_eq!(PaletteName::from_name("MAGMA"), PaletteName::Magma);
    let raster = RasterImage::new(1, 1, vec![0]).unwrap();
    let image = colorize(&raster, PaletteName::from_name("unheard-of"));
    assert_eq!(image.pixel(0, 0), Some([68, 1, 204, 255]));
}

#[test]
fn large_rasters_colorize_quickly() {
    let raster = gradient(1024, 1024);
    let started = std::time::Instant::now();
    let image = colorize(&raster, PaletteName::Viridis);
    assert_eq!(image.pixels().len(), 1024 * 1024);
    assert!(started.elapsed().as_secs() < 5);
}

#[test]
fn colorize_reruns_are_byte_identical() {
    let raster = gradient(64, 48);
    let original = raster.clone();
    for palette in PaletteName::ALL {
        let first = colorize(&raster, palette).to_rgba_bytes();
        let second = colorize(&raster, palette).to_rgba_bytes();
        assert_eq!(first, second);
    }
    assert_eq!(raster, original);
}
