pub mod masses;
pub mod springs;

use faer::prelude::*;

use crate::state::{NodeFreedomMap, State};
use masses::Masses;
use springs::Springs;

pub struct Elements {
    pub masses: Masses,
    pub springs: Springs,
}

impl Elements {
    pub fn new(masses: Masses, springs: Springs) -> Self {
        Self { masses, springs }
    }

    pub fn assemble_system(
        &self,
        nfm: &NodeFreedomMap,
        state: &State,
        mut m: MatMut<f64>, // Mass
        mut c: MatMut<f64>, // Damping
        mut k: MatMut<f64>, // Stiffness
        mut r: ColMut<f64>, // Residual
    ) {
        // Add mass elements to system
        self.masses
            .assemble_system(nfm, state, m.rb_mut(), r.rb_mut());

        // Add spring elements to system
        self.springs
            .assemble_system(nfm, state, k.rb_mut(), c.rb_mut(), r.rb_mut());
    }
}
