
mod dm;
