use super::{Storage, Tensor};

impl std::ops::Add for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: Self) -> Tensor {
        match (&self.storage, &rhs.storage) {
            (Storage::Cpu(a), Storage::Cpu(b)) => (a + b).into(),
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}

impl std::ops::Sub for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: Self) -> Tensor {
        match (&self.storage, &rhs.storage) {
            (Storage::Cpu(a), Storage::Cpu(b)) => (a - b).into(),
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}

impl std::ops::Mul<f32> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: f32) -> Tensor {
        match &self.storage {
            Storage::Cpu(a) => (a * rhs).into(),
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}

impl std::ops::Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Tensor {
        match (&self.storage, &rhs.storage) {
            (Storage::Cpu(a), Storage::Cpu(b)) => (a * b).into(),
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}

impl std::ops::AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, rhs: &Tensor) {
        match (&mut self.storage, &rhs.storage) {
            (Storage::Cpu(a), Storage::Cpu(b)) => *a += b,
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}

impl std::ops::SubAssign<&Tensor> for Tensor {
    fn sub_assign(&mut self, rhs: &Tensor) {
        match (&mut self.storage, &rhs.storage) {
            (Storage::Cpu(a), Storage::Cpu(b)) => *a -= b,
            #[cfg(feature = "cuda")]
            _ => panic!("tensor arithmetic across devices is not supported"),
        }
    }
}
