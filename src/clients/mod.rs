pub mod modrinth;
pub mod pufferpanel;
