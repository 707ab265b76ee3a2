//! 2SFCA chain on in-memory rasters, without the model's file plumbing.

use approx::assert_relative_eq;
use std::collections::HashMap;

use greenaccess_algorithms::prelude::*;

const SIZE: usize = 41;

fn grid<T: RasterElement>(value: T) -> Raster<T> {
    let mut r = Raster::filled(SIZE, SIZE, value);
    r.set_transform(GeoTransform::new(0.0, SIZE as f64 * 10.0, 10.0, -10.0));
    r
}

fn supply_with(method: ConvolutionMethod, radius: f64) -> Raster<f32> {
    let mut lulc = grid(0i32);
    lulc.set(20, 20, 1).unwrap();
    lulc.set(5, 30, 1).unwrap();
    let mut population = grid(4.0f32);
    population.set_nodata(Some(FLOAT32_NODATA));
    population.set(0, 0, FLOAT32_NODATA).unwrap();

    let kernel = decay_kernel(&DecayKernelParams {
        function: DecayFunction::Gaussian,
        radius,
        normalize: false,
    })
    .unwrap();
    let params = ConvolveParams {
        method,
        clamp_negative: true,
    };

    let area = greenspace_area(&lulc, &GreenspaceParams::new(HashMap::from([(0, false), (1, true)]))).unwrap();
    let decayed = convolve(&population, &kernel, &params).unwrap();
    let ratio = greenspace_population_ratio(&area, &decayed).unwrap();
    convolve(&ratio, &kernel, &params).unwrap()
}

#[test]
fn direct_and_fft_chains_agree() {
    let direct = supply_with(ConvolutionMethod::Direct, 16.0);
    let fft = supply_with(ConvolutionMethod::Fft, 16.0);
    for row in 0..SIZE {
        for col in 0..SIZE {
            assert_relative_eq!(
                direct.get(row, col).unwrap(),
                fft.get(row, col).unwrap(),
                epsilon = 1e-4
            );
        }
    }
}

#[test]
fn supply_is_non_negative_and_peaks_at_parks() {
    let supply = supply_with(ConvolutionMethod::Auto, 8.0);
    let stats = supply.statistics();
    assert!(stats.min.unwrap() >= 0.0);
    assert!(supply.get(20, 20).unwrap() > supply.get(20, 25).unwrap());
    // beyond the radius of both parks
    assert_eq!(supply.get(40, 0).unwrap(), 0.0);
}

#[test]
fn budget_partitions_population() {
    let supply = supply_with(ConvolutionMethod::Auto, 8.0);
    let mut population = grid(4.0f32);
    population.set_nodata(Some(FLOAT32_NODATA));
    let budget = greenspace_budget(&supply, 0.05).unwrap();

    let under = filter_population(&population, &budget, SupplyFilter::Undersupplied).unwrap();
    let over = filter_population(&population, &budget, SupplyFilter::Oversupplied).unwrap();
    let balanced: f64 = (0..SIZE)
        .flat_map(|r| (0..SIZE).map(move |c| (r, c)))
        .filter(|&(r, c)| budget.get(r, c).unwrap() == 0.0)
        .map(|(r, c)| population.get(r, c).unwrap() as f64)
        .sum();
    assert_relative_eq!(
        under.valid_sum() + over.valid_sum() + balanced,
        population.valid_sum(),
        max_relative = 1e-9
    );
    assert!(over.valid_sum() > 0.0);
}
