//! File-level round-trips through both containers.

use scanforge::{
    load_las, load_pcd, save_las, save_pcd, Color, DataType, LasHeader, PcdHeader, Point,
    PointCloud, Vector,
};

fn sample_cloud() -> PointCloud {
    let mut cloud = PointCloud::default();
    cloud.push(Point::new(Vector::new(1.0, 2.0, 3.0), Color::new(255, 0, 0)));
    cloud.push(Point::new(Vector::new(4.5, -5.25, 6.125), Color::new(0, 255, 0)));
    cloud.push(Point::new(Vector::new(-7.0, 8.0, 9.75), Color::new(64, 128, 255)));
    cloud.width = 3;
    cloud.height = 1;
    cloud
}

fn pcd_round_trip(data_type: DataType) -> (PcdHeader, PointCloud) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.pcd");

    let cloud = sample_cloud();
    let header = PcdHeader::for_cloud(&cloud, data_type);
    save_pcd(&path, &header, &cloud).unwrap();
    load_pcd(&path).unwrap()
}

#[test]
fn pcd_ascii_file_round_trip() {
    let (header, cloud) = pcd_round_trip(DataType::Ascii);
    assert!(header.is_valid());
    assert!(header.has_position());
    assert!(header.has_color());
    assert_eq!(cloud, sample_cloud());
}

#[test]
fn pcd_binary_file_round_trip() {
    let (_, cloud) = pcd_round_trip(DataType::Binary);
    assert_eq!(cloud, sample_cloud());
}

#[test]
fn pcd_binary_compressed_file_round_trip() {
    let (header, cloud) = pcd_round_trip(DataType::BinaryCompressed);
    assert_eq!(header.data_type, DataType::BinaryCompressed);
    assert_eq!(cloud, sample_cloud());
}

#[test]
fn las_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cloud.las");

    let cloud = sample_cloud();
    let header = LasHeader::for_cloud(&cloud, 3).unwrap();
    save_las(&path, &header, &cloud).unwrap();

    let (loaded_header, loaded) = load_las(&path).unwrap();
    assert!(loaded_header.is_valid());
    assert_eq!(loaded_header.version(), "1.3");
    assert!(loaded_header.has_color());
    assert!(loaded_header.has_gps_time());
    assert_eq!(loaded.len(), cloud.len());
    for (loaded, expected) in loaded.iter().zip(cloud.iter()) {
        assert!((loaded.position.x - expected.position.x).abs() < 0.02);
        assert!((loaded.position.y - expected.position.y).abs() < 0.02);
        assert!((loaded.position.z - expected.position.z).abs() < 0.02);
        assert_eq!(loaded.color, expected.color);
    }
}

#[test]
fn pcd_to_las_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let pcd_path = dir.path().join("cloud.pcd");
    let las_path = dir.path().join("cloud.las");

    let cloud = sample_cloud();
    let pcd_header = PcdHeader::for_cloud(&cloud, DataType::Binary);
    save_pcd(&pcd_path, &pcd_header, &cloud).unwrap();

    let (_, loaded) = load_pcd(&pcd_path).unwrap();
    let las_header = LasHeader::for_cloud(&loaded, 2).unwrap();
    save_las(&las_path, &las_header, &loaded).unwrap();

    let (_, final_cloud) = load_las(&las_path).unwrap();
    assert_eq!(final_cloud.len(), cloud.len());
    assert_eq!(final_cloud.points[2].color, Color::new(64, 128, 255));
}

#[test]
fn non_finite_points_are_dropped_on_reload() {
    for data_type in [DataType::Ascii, DataType::Binary] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.pcd");

        let mut cloud = sample_cloud();
        cloud.push(Point::new(
            Vector::new(f32::NAN, 0.0, 0.0),
            Color::default(),
        ));
        cloud.width = 4;
        let header = PcdHeader::for_cloud(&cloud, data_type);
        save_pcd(&path, &header, &cloud).unwrap();

        let (_, loaded) = load_pcd(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!loaded.is_dense);
        assert!(loaded.iter().all(|p| p.position.is_finite()));
    }
}

#[test]
fn missing_file_surfaces_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.pcd");
    assert!(matches!(load_pcd(&path), Err(scanforge::Error::Io(_))));
}
