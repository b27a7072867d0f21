use preguica::{Array, DType, PgError, SliceSpec};

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{a} != {e}");
    }
}

#[test]
fn test_slice_identity() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    let s = x.slice(&[SliceSpec::all(), SliceSpec::all()]).unwrap();
    assert_eq!(s.shape(), &[2, 3]);
    assert_close(&s.to_vec_f32().unwrap(), &x.to_vec_f32().unwrap());
}

#[test]
fn test_slice_strided_and_reversed() {
    let x = Array::arange(&[4, 4], 0.0, 1.0, DType::F32).unwrap();
    // rows 1 and 3; columns 3 and 1
    let s = x
        .slice(&[
            SliceSpec::new(Some(1), None, 2),
            SliceSpec::new(Some(3), Some(0), -2),
        ])
        .unwrap();
    assert_eq!(s.shape(), &[2, 2]);
    assert_close(&s.to_vec_f32().unwrap(), &[7.0, 5.0, 15.0, 13.0]);
}

#[test]
fn test_slice_negative_bounds() {
    let x = Array::arange(&[10], 0.0, 1.0, DType::F32).unwrap();
    let tail = x.slice(&[SliceSpec::new(Some(-3), None, 1)]).unwrap();
    assert_close(&tail.to_vec_f32().unwrap(), &[7.0, 8.0, 9.0]);

    let reversed = x.slice(&[SliceSpec::new(None, None, -1)]).unwrap();
    assert_close(
        &reversed.to_vec_f32().unwrap(),
        &[9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0],
    );
}

#[test]
fn test_slice_round_trip_shape() {
    // a[1:3, ::2, ::-1] on [4,6,8]
    let a = Array::arange(&[4, 6, 8], 0.0, 1.0, DType::F32).unwrap();
    let b = a
        .slice(&[
            SliceSpec::new(Some(1), Some(3), 1),
            SliceSpec::new(None, None, 2),
            SliceSpec::new(None, None, -1),
        ])
        .unwrap();
    assert_eq!(b.shape(), &[2, 3, 8]);
    // first element is a[1, 0, 7]
    assert_eq!(b.to_vec_f32().unwrap()[0], 55.0);
    // trailing axes default to the full range
    let c = a.slice(&[SliceSpec::new(Some(1), Some(3), 1)]).unwrap();
    assert_eq!(c.shape(), &[2, 6, 8]);
}

#[test]
fn test_slice_can_be_empty() {
    let x = Array::arange(&[4], 0.0, 1.0, DType::F32).unwrap();
    let e = x.slice(&[SliceSpec::new(Some(3), Some(1), 1)]).unwrap();
    assert_eq!(e.shape(), &[0]);
    assert_eq!(e.to_vec_f32().unwrap(), Vec::<f32>::new());
}

#[test]
fn test_slice_spec_validation() {
    let x = Array::arange(&[4], 0.0, 1.0, DType::F32).unwrap();
    assert!(x.slice(&[SliceSpec::new(None, None, 0)]).is_err());
    assert!(matches!(
        x.slice(&[SliceSpec::all(), SliceSpec::all()]),
        Err(PgError::AxisOutOfRange { .. })
    ));
}

#[test]
fn test_permute() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    let p = x.permute(&[1, 0]).unwrap();
    assert_eq!(p.shape(), &[3, 2]);
    assert_close(&p.to_vec_f32().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);

    assert!(matches!(
        x.permute(&[0, 0]),
        Err(PgError::AxisOutOfRange { .. })
    ));
    assert!(x.permute(&[0]).is_err());
}

#[test]
fn test_permute_round_trip() {
    let x = Array::arange(&[2, 3, 4], 0.0, 1.0, DType::F32).unwrap();
    let p = x.permute(&[2, 0, 1]).unwrap();
    assert_eq!(p.shape(), &[4, 2, 3]);
    let back = p.permute(&[1, 2, 0]).unwrap();
    assert_eq!(back.shape(), &[2, 3, 4]);
    assert_close(&back.to_vec_f32().unwrap(), &x.to_vec_f32().unwrap());
}

#[test]
fn test_transpose_reverses_the_interval() {
    let x = Array::zeros(&[2, 3, 4, 5], DType::F32).unwrap();
    assert_eq!(x.transpose(0, 2).unwrap().shape(), &[4, 3, 2, 5]);
    assert_eq!(x.transpose(-2, -1).unwrap().shape(), &[2, 3, 5, 4]);
    assert_eq!(x.transpose(1, -2).unwrap().shape(), &[2, 4, 3, 5]);

    let y = Array::arange(&[2, 2, 2], 0.0, 1.0, DType::F32).unwrap();
    let t = y.transpose(0, 1).unwrap();
    assert_close(
        &t.to_vec_f32().unwrap(),
        &[0.0, 1.0, 4.0, 5.0, 2.0, 3.0, 6.0, 7.0],
    );
}

#[test]
fn test_reshape_contiguous_is_free() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    let r = x.reshape(&[3, 2]).unwrap();
    assert_eq!(r.shape(), &[3, 2]);
    assert_close(&r.to_vec_f32().unwrap(), &x.to_vec_f32().unwrap());
    // free reshape shares the buffer rather than copying
    x.eval().unwrap();
    r.eval().unwrap();

    assert!(matches!(
        x.reshape(&[4, 2]),
        Err(PgError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_reshape_packs_non_contiguous_input() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    let p = x.permute(&[1, 0]).unwrap();
    let r = p.reshape(&[2, 3]).unwrap();
    // logical order of the permuted view, repacked
    assert_close(&r.to_vec_f32().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

#[test]
fn test_flatten() {
    let x = Array::arange(&[2, 3, 4], 0.0, 1.0, DType::F32).unwrap();
    let f = x.flatten(0, -1).unwrap();
    assert_eq!(f.shape(), &[24]);
    let f = x.flatten(1, 2).unwrap();
    assert_eq!(f.shape(), &[2, 12]);

    let p = Array::arange(&[2, 3], 0.0, 1.0, DType::F32)
        .unwrap()
        .permute(&[1, 0])
        .unwrap();
    let f = p.flatten(0, -1).unwrap();
    assert_close(&f.to_vec_f32().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

#[test]
fn test_unsqueeze() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    assert_eq!(x.unsqueeze(-1).unwrap().shape(), &[2, 3, 1]);
    assert_eq!(x.unsqueeze(0).unwrap().shape(), &[1, 2, 3]);
    assert_eq!(x.unsqueeze(1).unwrap().shape(), &[2, 1, 3]);
    assert_close(
        &x.unsqueeze(-1).unwrap().to_vec_f32().unwrap(),
        &x.to_vec_f32().unwrap(),
    );

    // works on non-contiguous views without packing
    let p = x.permute(&[1, 0]).unwrap();
    let u = p.unsqueeze(0).unwrap();
    assert_eq!(u.shape(), &[1, 3, 2]);
    assert_close(&u.to_vec_f32().unwrap(), &[0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
}

#[test]
fn test_expand() {
    let x = Array::from_f32(&[1.0, 2.0, 3.0], &[3, 1]).unwrap();
    let e = x.expand(&[3, 4]).unwrap();
    assert_eq!(e.shape(), &[3, 4]);
    assert_close(
        &e.to_vec_f32().unwrap(),
        &[1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 3.0, 3.0, 3.0, 3.0],
    );
    // leading broadcast axis
    let e = x.expand(&[2, 3, 1]).unwrap();
    assert_eq!(e.shape(), &[2, 3, 1]);
    // a non-1 axis cannot change size
    assert!(x.expand(&[4, 1]).is_err());
}

#[test]
fn test_astype() {
    let f = Array::from_f32(&[1.9, -1.9, 0.0], &[3]).unwrap();
    let i = f.astype(DType::I32);
    // truncation toward zero
    assert_eq!(i.to_vec_i32().unwrap(), vec![1, -1, 0]);

    let b = f.astype(DType::B8);
    assert_eq!(b.to_vec_b8().unwrap(), vec![true, true, false]);

    let back = Array::from_b8(&[true, false], &[2]).unwrap().astype(DType::F32);
    assert_close(&back.to_vec_f32().unwrap(), &[1.0, 0.0]);

    // saturating cast of an out-of-range float
    let big = Array::from_f32(&[3.0e9, -3.0e9], &[2]).unwrap().astype(DType::I32);
    assert_eq!(big.to_vec_i32().unwrap(), vec![i32::MAX, i32::MIN]);

    // same-dtype cast is the identity
    let same = f.astype(DType::F32);
    assert_eq!(same.id(), f.id());
}

#[test]
fn test_detach() {
    let x = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    assert!(x.requires_grad());
    let d = x.detach();
    assert!(!d.requires_grad());
    assert_ne!(d.id(), x.id());
    assert_close(&d.to_vec_f32().unwrap(), &[1.0, 2.0]);
}

#[test]
fn test_contiguous() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    // already packed: no new node
    let same = x.contiguous();
    assert_eq!(same.id(), x.id());

    let p = x.permute(&[1, 0]).unwrap();
    assert!(!p.is_contiguous());
    let c = p.contiguous();
    assert!(c.is_contiguous());
    assert_close(&c.to_vec_f32().unwrap(), &p.to_vec_f32().unwrap());
}

#[test]
fn test_item() {
    let s = Array::full(&[], 3.5f32).unwrap();
    assert_eq!(s.shape(), &[] as &[usize]);
    assert_eq!(s.item().unwrap().to_f32(), 3.5);

    let one = Array::from_i32(&[7], &[1]).unwrap();
    assert_eq!(one.item().unwrap().to_i32(), 7);

    let two = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    assert!(matches!(two.item(), Err(PgError::NotScalar { len: 2 })));
}

#[test]
fn test_to_raw_packs_views() {
    let x = Array::arange(&[3, 3], 0.0, 1.0, DType::F32).unwrap();
    let col = x
        .slice(&[SliceSpec::all(), SliceSpec::new(Some(1), Some(2), 1)])
        .unwrap();
    match col.to_raw().unwrap() {
        preguica::Buffer::F32(v) => assert_eq!(v, vec![1.0, 4.0, 7.0]),
        _ => panic!("expected f32 buffer"),
    }
}
