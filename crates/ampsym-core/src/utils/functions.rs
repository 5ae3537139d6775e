use factorial::Factorial;
use num::complex::Complex64;

use crate::PI;

fn factorial_ratio(numerator: usize, denominator: usize) -> f64 {
    match (numerator as u64)
        .checked_factorial()
        .zip((denominator as u64).checked_factorial())
    {
        Some((num, den)) => num as f64 / den as f64,
        None => {
            let (lo, hi, invert) = if numerator <= denominator {
                (numerator, denominator, false)
            } else {
                (denominator, numerator, true)
            };
            let ratio = ((lo + 1)..=hi).fold(1.0, |acc, k| acc / k as f64);
            if invert {
                1.0 / ratio
            } else {
                ratio
            }
        }
    }
}

/// The associated Legendre function $`P_\ell^m(x)`$ for $`m \geq 0`$, including the
/// Condon-Shortley phase $`(-1)^m`$. Returns zero for $`m > \ell`$.
pub fn legendre_associated(l: usize, m: usize, x: f64) -> f64 {
    if m > l {
        return 0.0;
    }
    let y = f64::sqrt((1.0 - x * x).max(0.0));
    let mut p_mm = 1.0;
    for m_p in 0..m {
        p_mm *= -((2 * m_p + 1) as f64) * y;
    }
    if l == m {
        return p_mm;
    }
    let mut p_min_2 = p_mm;
    let mut p_min_1 = (2 * m + 1) as f64 * x * p_mm;
    for l_p in (m + 2)..=l {
        let p = ((2 * l_p - 1) as f64 * x * p_min_1 - (l_p + m - 1) as f64 * p_min_2)
            / (l_p - m) as f64;
        p_min_2 = p_min_1;
        p_min_1 = p;
    }
    p_min_1
}

/// The orthonormal spherical harmonic $`Y_\ell^m(\theta, \phi)`$ evaluated at
/// $`\cos\theta`$ and $`\phi`$.
///
/// Uses the Condon-Shortley phase convention and $`Y_\ell^{-m} = (-1)^m \overline{Y_\ell^m}`$.
/// The function vanishes identically for $`|m| > \ell`$.
pub fn spherical_harmonic(l: usize, m: isize, costheta: f64, phi: f64) -> Complex64 {
    let abs_m = m.unsigned_abs();
    if abs_m > l {
        return Complex64::ZERO;
    }
    let norm = f64::sqrt((2 * l + 1) as f64 / (4.0 * PI) * factorial_ratio(l - abs_m, l + abs_m));
    let magnitude = norm * legendre_associated(l, abs_m, costheta);
    let positive = Complex64::from_polar(1.0, abs_m as f64 * phi) * magnitude;
    if m < 0 {
        let phase = if abs_m % 2 == 0 { 1.0 } else { -1.0 };
        positive.conj() * phase
    } else {
        positive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_legendre_low_orders() {
        assert_relative_eq!(legendre_associated(0, 0, 0.3), 1.0);
        assert_relative_eq!(legendre_associated(1, 0, 0.3), 0.3);
        assert_relative_eq!(legendre_associated(2, 0, 0.3), 0.5 * (3.0 * 0.09 - 1.0));
        assert_relative_eq!(
            legendre_associated(1, 1, 0.3),
            -f64::sqrt(1.0 - 0.09),
            epsilon = 1e-14
        );
        assert_relative_eq!(
            legendre_associated(2, 2, 0.3),
            3.0 * (1.0 - 0.09),
            epsilon = 1e-14
        );
        assert_eq!(legendre_associated(1, 2, 0.3), 0.0);
    }

    #[test]
    fn test_spherical_harmonic_values() {
        let y00 = spherical_harmonic(0, 0, 0.2, 1.0);
        assert_relative_eq!(y00.re, 0.28209479177387814, epsilon = 1e-12);
        assert_relative_eq!(y00.im, 0.0);

        let y11 = spherical_harmonic(1, 1, 0.0, 0.0);
        assert_relative_eq!(y11.re, -f64::sqrt(3.0 / (8.0 * PI)), epsilon = 1e-12);

        let y1m1 = spherical_harmonic(1, -1, 0.0, 0.0);
        assert_relative_eq!(y1m1.re, f64::sqrt(3.0 / (8.0 * PI)), epsilon = 1e-12);

        let y20 = spherical_harmonic(2, 0, 0.5, 0.7);
        assert_relative_eq!(
            y20.re,
            f64::sqrt(5.0 / (16.0 * PI)) * (3.0 * 0.25 - 1.0),
            epsilon = 1e-12
        );
        assert_relative_eq!(y20.im, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn test_spherical_harmonic_negative_m_relation() {
        for (l, m) in [(1usize, 1isize), (2, 1), (2, 2), (3, 2), (4, 3)] {
            let pos = spherical_harmonic(l, m, 0.37, 2.1);
            let neg = spherical_harmonic(l, -m, 0.37, 2.1);
            let sign = if m % 2 == 0 { 1.0 } else { -1.0 };
            assert_relative_eq!(neg.re, sign * pos.re, epsilon = 1e-12);
            assert_relative_eq!(neg.im, -sign * pos.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_spherical_harmonic_vanishes_above_order() {
        assert_eq!(spherical_harmonic(1, 2, 0.4, 0.1), Complex64::ZERO);
        assert_eq!(spherical_harmonic(0, -1, 0.4, 0.1), Complex64::ZERO);
    }

    #[test]
    fn test_factorial_ratio_large_arguments() {
        assert_relative_eq!(factorial_ratio(3, 5), 1.0 / 20.0);
        assert_relative_eq!(factorial_ratio(20, 22), 1.0 / (21.0 * 22.0), epsilon = 1e-15);
        assert_relative_eq!(factorial_ratio(22, 20), 21.0 * 22.0, epsilon = 1e-10);
    }
}
