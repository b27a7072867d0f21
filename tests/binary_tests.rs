use preguica::{Array, DType, PgError};

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{a} != {e}");
    }
}

#[test]
fn test_add_sub_mul_div() {
    let a = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    let b = Array::from_f32(&[3.0, 4.0], &[2]).unwrap();
    assert_close(&(&a + &b).unwrap().to_vec_f32().unwrap(), &[4.0, 6.0]);
    assert_close(&(&a - &b).unwrap().to_vec_f32().unwrap(), &[-2.0, -2.0]);
    assert_close(&(&a * &b).unwrap().to_vec_f32().unwrap(), &[3.0, 8.0]);
    assert_close(&(&a / &b).unwrap().to_vec_f32().unwrap(), &[1.0 / 3.0, 0.5]);
}

#[test]
fn test_add_broadcast_full() {
    // [2,1,4] + [3,4] -> [2,3,4], every element 3
    let a = Array::full(&[2, 1, 4], 1.0f32).unwrap();
    let b = Array::full(&[3, 4], 2.0f32).unwrap();
    let c = (&a + &b).unwrap();
    assert_eq!(c.shape(), &[2, 3, 4]);
    assert_eq!(c.to_vec_f32().unwrap(), vec![3.0; 24]);
}

#[test]
fn test_broadcast_values() {
    let a = Array::from_f32(&[1.0, 2.0], &[2, 1]).unwrap();
    let b = Array::from_f32(&[10.0, 20.0, 30.0], &[3]).unwrap();
    let c = (&a + &b).unwrap();
    assert_eq!(c.shape(), &[2, 3]);
    assert_close(
        &c.to_vec_f32().unwrap(),
        &[11.0, 21.0, 31.0, 12.0, 22.0, 32.0],
    );
}

#[test]
fn test_broadcast_equivalence_with_expand() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    let b = Array::from_f32(&[0.5, 1.5, 2.5], &[1, 3]).unwrap();
    let direct = (&a + &b).unwrap().to_vec_f32().unwrap();
    let expanded = (&a + &b.expand(&[2, 3]).unwrap()).unwrap().to_vec_f32().unwrap();
    assert_close(&direct, &expanded);
}

#[test]
fn test_broadcast_mismatch_is_an_error() {
    let a = Array::zeros(&[2, 3], DType::F32).unwrap();
    let b = Array::zeros(&[4, 3], DType::F32).unwrap();
    assert!(matches!(
        a.add(&b),
        Err(PgError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_promotion_rules() {
    let i = Array::from_i32(&[1, 2], &[2]).unwrap();
    let f = Array::from_f32(&[0.5, 0.5], &[2]).unwrap();
    let sum = (&i + &f).unwrap();
    assert_eq!(sum.dtype(), DType::F32);
    assert_close(&sum.to_vec_f32().unwrap(), &[1.5, 2.5]);

    // boolean arithmetic lifts to i32
    let b = Array::from_b8(&[true, false], &[2]).unwrap();
    let bb = (&b + &b).unwrap();
    assert_eq!(bb.dtype(), DType::I32);
    assert_eq!(bb.to_vec_i32().unwrap(), vec![2, 0]);

    // division is always f32
    let q = (&i / &i).unwrap();
    assert_eq!(q.dtype(), DType::F32);
    assert_close(&q.to_vec_f32().unwrap(), &[1.0, 1.0]);
    let q = Array::from_i32(&[1, 3], &[2])
        .unwrap()
        .div(&Array::from_i32(&[2, 2], &[2]).unwrap())
        .unwrap();
    assert_close(&q.to_vec_f32().unwrap(), &[0.5, 1.5]);
}

#[test]
fn test_maximum_minimum() {
    let a = Array::from_f32(&[1.0, 5.0, 3.0], &[3]).unwrap();
    let b = Array::from_f32(&[4.0, 2.0, 3.0], &[3]).unwrap();
    assert_close(&a.maximum(&b).unwrap().to_vec_f32().unwrap(), &[4.0, 5.0, 3.0]);
    assert_close(&a.minimum(&b).unwrap().to_vec_f32().unwrap(), &[1.0, 2.0, 3.0]);
}

#[test]
fn test_comparisons_yield_b8() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0], &[3]).unwrap();
    let b = Array::from_f32(&[2.0, 2.0, 2.0], &[3]).unwrap();
    assert_eq!(a.eq(&b).unwrap().to_vec_b8().unwrap(), vec![false, true, false]);
    assert_eq!(a.lt(&b).unwrap().to_vec_b8().unwrap(), vec![true, false, false]);
    assert_eq!(a.le(&b).unwrap().to_vec_b8().unwrap(), vec![true, true, false]);
    assert_eq!(a.gt(&b).unwrap().to_vec_b8().unwrap(), vec![false, false, true]);
    assert_eq!(a.ge(&b).unwrap().to_vec_b8().unwrap(), vec![false, true, true]);
}

#[test]
fn test_comparison_promotes_mixed_dtypes() {
    let i = Array::from_i32(&[1, 2, 3], &[3]).unwrap();
    let f = Array::from_f32(&[1.5, 2.0, 2.5], &[3]).unwrap();
    let lt = i.lt(&f).unwrap();
    assert_eq!(lt.dtype(), DType::B8);
    assert_eq!(lt.to_vec_b8().unwrap(), vec![true, false, false]);
}

#[test]
fn test_scalar_operands() {
    let x = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    assert_close(&(&x + 1.0f32).unwrap().to_vec_f32().unwrap(), &[2.0, 3.0]);
    assert_close(&(&x * 2.0f32).unwrap().to_vec_f32().unwrap(), &[2.0, 4.0]);
    assert_close(&(3.0f32 - &x).unwrap().to_vec_f32().unwrap(), &[2.0, 1.0]);
    assert_close(&(1.0f32 / &x).unwrap().to_vec_f32().unwrap(), &[1.0, 0.5]);

    // integer scalars keep integer arrays integral
    let i = Array::from_i32(&[1, 2], &[2]).unwrap();
    let tripled = (&i * 3i32).unwrap();
    assert_eq!(tripled.dtype(), DType::I32);
    assert_eq!(tripled.to_vec_i32().unwrap(), vec![3, 6]);

    // a float scalar promotes them
    let shifted = (&i + 0.5f32).unwrap();
    assert_eq!(shifted.dtype(), DType::F32);
    assert_close(&shifted.to_vec_f32().unwrap(), &[1.5, 2.5]);
}

#[test]
fn test_inplace_binary() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0], &[3]).unwrap();
    let b = Array::from_f32(&[10.0, 20.0, 30.0], &[3]).unwrap();
    let c = a.add_(&b).unwrap();
    assert_close(&c.to_vec_f32().unwrap(), &[11.0, 22.0, 33.0]);
    // apply again on the returned handle, like `a += b` twice
    let d = c.add_(&b).unwrap();
    assert_close(&d.to_vec_f32().unwrap(), &[21.0, 42.0, 63.0]);
}

#[test]
fn test_inplace_binary_broadcasts_the_right_side() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    let b = Array::from_f32(&[1.0, 10.0, 100.0], &[3]).unwrap();
    let c = a.mul_(&b).unwrap();
    assert_eq!(c.shape(), &[2, 3]);
    assert_close(
        &c.to_vec_f32().unwrap(),
        &[1.0, 20.0, 300.0, 4.0, 50.0, 600.0],
    );
}

#[test]
fn test_inplace_rejects_broadcasting_the_destination() {
    let a = Array::from_f32(&[1.0, 2.0, 3.0], &[3]).unwrap();
    let b = Array::zeros(&[2, 3], DType::F32).unwrap();
    assert!(matches!(
        a.add_(&b),
        Err(PgError::InplaceConflict { .. })
    ));
}

#[test]
fn test_inplace_rejects_promotion() {
    let i = Array::from_i32(&[1, 2], &[2]).unwrap();
    let f = Array::from_f32(&[0.5, 0.5], &[2]).unwrap();
    assert!(matches!(i.add_(&f), Err(PgError::DTypeMismatch { .. })));
    assert!(matches!(i.div_(&i), Err(PgError::DTypeMismatch { .. })));
}

#[test]
fn test_inplace_with_itself() {
    let a = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    let doubled = a.add_(&a).unwrap();
    assert_close(&doubled.to_vec_f32().unwrap(), &[2.0, 4.0]);
}

#[test]
fn test_inplace_consumes_the_source_handle() {
    let a = Array::from_f32(&[1.0, 2.0], &[2]).unwrap();
    let b = Array::from_f32(&[1.0, 1.0], &[2]).unwrap();
    let _sum = a.add_(&b).unwrap().eval().unwrap();
    // the old handle's value is gone, not silently updated
    assert!(matches!(a.to_raw(), Err(PgError::InplaceConflict { .. })));
}
