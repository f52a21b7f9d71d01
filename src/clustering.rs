use crate::all::*;

// Groups point indices by spatial proximity. Every index appears in exactly
// one group and the enumeration order must be deterministic.
pub trait ClusteringEngine {
  fn cluster(&mut self, points: &[Vector2d], distance_threshold: f64) -> Vec<Vec<usize>>;
}

// Single-linkage hierarchical clustering cut at a distance: two points share
// a cluster iff a chain of points with consecutive distances at most the
// threshold connects them. Clusters are ordered by their smallest member.
pub struct SingleLinkage {
  parents: Vec<usize>,
}

impl SingleLinkage {
  pub fn new() -> SingleLinkage {
    SingleLinkage { parents: vec![] }
  }

  fn find(&mut self, mut i: usize) -> usize {
    while self.parents[i] != i {
      self.parents[i] = self.parents[self.parents[i]];
      i = self.parents[i];
    }
    i
  }

  fn union(&mut self, a: usize, b: usize) {
    let a = self.find(a);
    let b = self.find(b);
    // Smaller index as root keeps roots equal to the first member.
    if a < b { self.parents[b] = a } else if b < a { self.parents[a] = b }
  }
}

impl ClusteringEngine for SingleLinkage {
  fn cluster(&mut self, points: &[Vector2d], distance_threshold: f64) -> Vec<Vec<usize>> {
    let n = points.len();
    self.parents.clear();
    self.parents.extend(0..n);
    let t2 = distance_threshold * distance_threshold;
    for i in 0..n {
      for j in (i + 1)..n {
        if (points[i] - points[j]).norm_squared() <= t2 {
          self.union(i, j);
        }
      }
    }

    let mut clusters: Vec<Vec<usize>> = vec![];
    let mut cluster_of_root = vec![usize::MAX; n];
    for i in 0..n {
      let root = self.find(i);
      if cluster_of_root[root] == usize::MAX {
        cluster_of_root[root] = clusters.len();
        clusters.push(vec![]);
      }
      clusters[cluster_of_root[root]].push(i);
    }
    clusters
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn points(v: &[[f64; 2]]) -> Vec<Vector2d> {
    v.iter().map(|p| Vector2d::new(p[0], p[1])).collect()
  }

  #[test]
  fn test_two_groups() {
    let p = points(&[[0., 0.], [100., 100.], [5., 0.], [105., 100.], [0., 5.]]);
    let clusters = SingleLinkage::new().cluster(&p, 20.);
    assert_eq!(clusters, vec![vec![0, 2, 4], vec![1, 3]]);
  }

  #[test]
  fn test_chaining() {
    // Ends are 40 apart but linked through the middle point.
    let p = points(&[[0., 0.], [40., 0.], [20., 0.]]);
    assert_eq!(SingleLinkage::new().cluster(&p, 20.), vec![vec![0, 1, 2]]);
    assert_eq!(SingleLinkage::new().cluster(&p, 19.9), vec![vec![0], vec![1], vec![2]]);
  }

  #[test]
  fn test_order_follows_first_member() {
    let p = points(&[[50., 50.], [0., 0.], [51., 50.], [200., 0.], [1., 0.]]);
    let clusters = SingleLinkage::new().cluster(&p, 5.);
    assert_eq!(clusters, vec![vec![0, 2], vec![1, 4], vec![3]]);
  }

  #[test]
  fn test_empty() {
    assert!(SingleLinkage::new().cluster(&[], 20.).is_empty());
  }
}
