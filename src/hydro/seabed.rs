use crate::{hydro::environment::SeabedContact, util::Vec3};

/// Contact force on a node penetrating the seabed, `length` is the element
/// length tributary to the node
pub fn seabed_force(
    contact: &SeabedContact,
    seabed_level: f64,
    position: &Vec3,
    velocity: &Vec3,
    length: f64,
) -> Option<Vec3> {
    let penetration = seabed_level - position[2];
    if penetration <= 0. {
        return None;
    }

    // Normal reaction never pulls the node down
    let pressure = contact.stiffness * penetration - contact.damping * velocity[2];
    let normal = (length * pressure).max(0.);

    // Regularized Coulomb friction opposing horizontal sliding
    let (vx, vy) = (velocity[0], velocity[1]);
    let speed = (vx * vx + vy * vy).sqrt();
    let scale = contact.friction * normal / speed.max(contact.friction_velocity);
    Some([-scale * vx, -scale * vy, normal])
}
