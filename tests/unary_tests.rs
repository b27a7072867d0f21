use preguica::{Array, DType, SliceSpec};

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{a} != {e}");
    }
}

#[test]
fn test_exp() {
    let x = Array::from_f32(&[0.0, 1.0, -1.0], &[3]).unwrap();
    let y = x.exp();
    assert_close(&y.to_vec_f32().unwrap(), &[1.0, 2.7182817, 0.36787945]);
}

#[test]
fn test_neg() {
    let x = Array::from_f32(&[1.0, -2.0, 0.0], &[3]).unwrap();
    assert_close(&x.neg().to_vec_f32().unwrap(), &[-1.0, 2.0, 0.0]);
    // operator form
    let y = -&x;
    assert_close(&y.to_vec_f32().unwrap(), &[-1.0, 2.0, 0.0]);
}

#[test]
fn test_neg_keeps_integers() {
    let x = Array::from_i32(&[1, -2], &[2]).unwrap();
    let y = x.neg();
    assert_eq!(y.dtype(), DType::I32);
    assert_eq!(y.to_vec_i32().unwrap(), vec![-1, 2]);
}

#[test]
fn test_neg_promotes_booleans() {
    let x = Array::from_b8(&[true, false], &[2]).unwrap();
    let y = x.neg();
    assert_eq!(y.dtype(), DType::I32);
    assert_eq!(y.to_vec_i32().unwrap(), vec![-1, 0]);
}

#[test]
fn test_log() {
    let x = Array::from_f32(&[1.0, std::f32::consts::E, 7.389056], &[3]).unwrap();
    assert_close(&x.log().to_vec_f32().unwrap(), &[0.0, 1.0, 2.0]);
}

#[test]
fn test_log_domain_is_not_an_error() {
    let x = Array::from_f32(&[-1.0, 0.0], &[2]).unwrap();
    let y = x.log().to_vec_f32().unwrap();
    assert!(y[0].is_nan());
    assert!(y[1].is_infinite() && y[1] < 0.0);
}

#[test]
fn test_sqrt() {
    let x = Array::from_f32(&[0.0, 1.0, 4.0, 2.25], &[4]).unwrap();
    assert_close(&x.sqrt().to_vec_f32().unwrap(), &[0.0, 1.0, 2.0, 1.5]);
    let y = Array::from_f32(&[-1.0], &[1]).unwrap().sqrt();
    assert!(y.to_vec_f32().unwrap()[0].is_nan());
}

#[test]
fn test_sq() {
    let x = Array::from_f32(&[1.5, -2.0, 3.0], &[3]).unwrap();
    assert_close(&x.sq().to_vec_f32().unwrap(), &[2.25, 4.0, 9.0]);
    let i = Array::from_i32(&[-3, 4], &[2]).unwrap().sq();
    assert_eq!(i.to_vec_i32().unwrap(), vec![9, 16]);
}

#[test]
fn test_recip() {
    let x = Array::from_f32(&[1.0, 2.0, -4.0], &[3]).unwrap();
    assert_close(&x.recip().to_vec_f32().unwrap(), &[1.0, 0.5, -0.25]);
    let y = Array::from_f32(&[0.0], &[1]).unwrap().recip();
    assert!(y.to_vec_f32().unwrap()[0].is_infinite());
}

#[test]
fn test_float_ops_lift_integer_inputs() {
    let x = Array::from_i32(&[1, 2], &[2]).unwrap();
    let y = x.exp();
    assert_eq!(y.dtype(), DType::F32);
    assert_close(&y.to_vec_f32().unwrap(), &[2.7182817, 7.389056]);
}

#[test]
fn test_unary_through_a_slice() {
    // rows 1..3, every other column of a 4x4 arange
    let x = Array::arange(&[4, 4], 0.0, 1.0, DType::F32).unwrap();
    let s = x
        .slice(&[
            SliceSpec::new(Some(1), Some(3), 1),
            SliceSpec::new(None, None, 2),
        ])
        .unwrap();
    assert_eq!(s.shape(), &[2, 2]);
    let y = s.neg();
    assert_close(&y.to_vec_f32().unwrap(), &[-4.0, -6.0, -8.0, -10.0]);
}

#[test]
fn test_unary_through_a_permute() {
    let x = Array::arange(&[2, 3], 0.0, 1.0, DType::F32).unwrap();
    let y = x.permute(&[1, 0]).unwrap().sq();
    assert_eq!(y.shape(), &[3, 2]);
    assert_close(&y.to_vec_f32().unwrap(), &[0.0, 9.0, 1.0, 16.0, 4.0, 25.0]);
}

#[test]
fn test_inplace_unary_matches_out_of_place() {
    let data = [0.5, 1.0, 2.0, 4.0];
    let reference = Array::from_f32(&data, &[4]).unwrap().exp();
    let x = Array::from_f32(&data, &[4]).unwrap();
    let y = x.exp_().unwrap();
    assert_close(
        &y.to_vec_f32().unwrap(),
        &reference.to_vec_f32().unwrap(),
    );
}

#[test]
fn test_inplace_chain() {
    // sqrt then log, both reusing one buffer
    let x = Array::from_f32(&[1.0, 4.0, 16.0], &[3]).unwrap();
    let y = x.sqrt_().unwrap();
    let z = y.log_().unwrap();
    assert_close(&z.to_vec_f32().unwrap(), &[0.0, 2.0f32.ln(), 4.0f32.ln()]);
}

#[test]
fn test_inplace_rejects_dtype_changes() {
    let x = Array::from_i32(&[1, 2], &[2]).unwrap();
    assert!(x.exp_().is_err());
    // neg keeps i32, so the in-place form is fine
    let y = x.neg_().unwrap();
    assert_eq!(y.to_vec_i32().unwrap(), vec![-1, -2]);
}
