use preguica::{
    disable_memory_profile, enable_memory_profile, memory_profile, save_memory_profile, Array,
    DType,
};

#[test]
fn test_memory_profile_records_ops_and_peaks() {
    enable_memory_profile();

    let a = Array::arange(&[64, 64], 0.0, 1.0, DType::F32).unwrap();
    let b = a.sq();
    let s = b.sum(&[]).unwrap();
    s.eval().unwrap();

    let profile = memory_profile().expect("profiling enabled");
    assert!(profile.total_allocations >= 3);
    // peak covers at least one 64x64 f32 buffer
    assert!(profile.peak_bytes >= 64 * 64 * 4);

    let kinds: Vec<&str> = profile.ops.iter().map(|op| op.kind.as_str()).collect();
    assert!(kinds.contains(&"arange"));
    assert!(kinds.contains(&"sq"));
    assert!(kinds.contains(&"sum"));
    let sq_record = profile.ops.iter().find(|op| op.kind == "sq").unwrap();
    assert_eq!(sq_record.shape, vec![64, 64]);
    assert_eq!(sq_record.dtype, "f32");
    assert_eq!(sq_record.bytes, 64 * 64 * 4);

    let path = std::env::temp_dir().join("preguica_profile_test.json");
    save_memory_profile(&path).unwrap();
    let dumped = std::fs::read_to_string(&path).unwrap();
    assert!(dumped.contains("peak_bytes"));
    assert!(dumped.contains("total_allocations"));
    let parsed: serde_json::Value = serde_json::from_str(&dumped).unwrap();
    assert!(parsed["ops"].as_array().unwrap().len() >= 3);
    std::fs::remove_file(&path).ok();

    disable_memory_profile();
    assert!(memory_profile().is_none());
}
